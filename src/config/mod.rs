// src/config/mod.rs
//! Configuration management for the CPU miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading and validating configuration files
//! - Generating configuration templates
//! - Per-thread lane, prefetch and affinity settings
//!
//! The configuration uses TOML format.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and the per-thread [`ThreadConfig`].
pub mod config;

// Re-export key items for easy access
pub use config::{Config, ThreadConfig};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
///
/// # Arguments
/// * `threads` - Number of `[[cpu_threads]]` entries to include
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template(threads: usize) -> String {
    Config::generate_template(threads)
}
