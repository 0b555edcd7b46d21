// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components of the CPU worker engine:
//! - Job records and the lock-free job broadcast with its nonce cursor
//! - Hash backends and per-thread hash function selection
//! - Scratchpad allocation and thread affinity
//! - Worker threads, their startup and the hash self-test

/// Hash backends and function selection
///
/// Contains the [`HashEngine`] interface, the CryptoNight backend and the
/// variant table every worker resolves its [`HashFn`] from.
pub mod algorithm;

/// Pinning worker threads to CPUs
pub mod affinity;

/// Job publication and nonce partitioning
///
/// Holds the current job, its sequence number and the shared nonce cursor.
pub mod broadcast;

/// Job and result records
pub mod job;

/// Scratchpad memory under the slow-memory policy
pub mod memory;

/// Hash self-test run before any worker starts
pub mod selftest;

/// Starting and stopping the configured worker set
pub mod starter;

/// Worker thread implementation
///
/// Contains the worker thread logic that performs actual hash computations.
/// Workers copy jobs from the broadcast and submit qualifying results.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::{CryptoNightEngine, HashEngine, HashFn, HashVariant};
pub use self::broadcast::{JobBroadcast, PublishedJob};
pub use self::job::{Job, JobId, JobResult, meets_target, target_from_compact, target_from_difficulty};
pub use self::selftest::{run_self_test, self_test};
pub use self::starter::{start_workers, stop_workers};
pub use self::worker::{MinerContext, WorkerTelemetry, WorkerThread};
