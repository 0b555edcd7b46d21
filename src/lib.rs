//! XMR CPU Miner - CryptoNight worker engine for CPUs in Rust
//!
//! This crate provides the CPU side of a CryptoNight miner:
//! - Lock-free job broadcast with disjoint nonce windows per thread
//! - Scalar and N-way batched hashing with per-thread variant selection
//! - Huge page scratchpads, thread affinity and a startup self-test
//! - Hashrate telemetry and benchmarking

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Miner core implementation including job broadcast and worker threads
pub mod miner;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::{Config, ThreadConfig};
pub use miner::{
    CryptoNightEngine, HashEngine, Job, JobBroadcast, JobId, JobResult, MinerContext, WorkerThread,
    self_test, start_workers,
};
pub use stats::{HardwareStats, MiningStats, StatsReporter};
pub use types::{AlgorithmType, SlowMemoryPolicy};
pub use utils::{MinerError, init_logging};
