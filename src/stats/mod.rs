//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Per-thread hashrate history over 10s, 60s and 15m windows
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! The main component is [`StatsReporter`] which samples the workers' live
//! counters and periodically reports statistics to the log.
//!

/// Ring-buffer hashrate history
pub mod telemetry;

/// Submodule containing the statistics reporter implementation
///
/// The reporter handles:
/// - Sampling of worker counters every 500ms
/// - Hardware monitoring
/// - Periodic reporting of stats
pub mod reporter;

// Re-export main components
pub use reporter::{HardwareStats, MiningStats, StatsReporter, format_rate};
pub use telemetry::{Telemetry, WINDOWS_MS};
