// src/utils/error.rs
use std::io;
use thiserror::Error;

/// Main error type for the mining engine
///
/// Startup failures (self-test, memory, configuration) are the only
/// errors the engine ever surfaces; the hashing loop itself never fails.
#[derive(Error, Debug)]
pub enum MinerError {
    /// The hash backend cannot provide a requested variant
    #[error("Algorithm error: {0}")]
    AlgorithmError(String),

    /// Hash self-test produced an unexpected digest
    #[error("Self-test failed: {0}")]
    SelfTestFailed(String),

    /// Scratchpad allocation failed under the active memory policy
    #[error("Memory allocation failed: {0}")]
    MemoryAllocation(String),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// OS thread could not be spawned
    #[error("Thread spawn failed: {0}")]
    ThreadSpawn(#[source] io::Error),

    /// Worker thread exited before completing its startup handshake
    #[error("Worker {0} died during startup")]
    WorkerStartup(usize),

    /// CPU affinity could not be applied
    #[error("Affinity error: {0}")]
    AffinityError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),
}

/// Converts TOML parse errors into MinerError
///
/// Wraps the original error in a `ConfigError` variant with context.
impl From<toml::de::Error> for MinerError {
    fn from(e: toml::de::Error) -> Self {
        MinerError::ConfigError(format!("Invalid config format: {}", e))
    }
}

