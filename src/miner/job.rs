// src/miner/job.rs
//! Job and result records exchanged with the job source and result sink

use crate::utils::error::MinerError;
use std::fmt;

/// Largest block header blob a job may carry
pub const MAX_BLOB_SIZE: usize = 112;

/// Byte offset of the 32-bit little-endian nonce inside the blob
pub const NONCE_OFFSET: usize = 39;

/// Nonce bits owned by the pool in NiceHash mode
pub const NICEHASH_PREFIX_MASK: u32 = 0xFF00_0000;

/// Opaque pool job identifier (zero padded)
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct JobId([u8; 32]);

impl JobId {
    /// Builds an id from at most 32 raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MinerError> {
        if bytes.len() > 32 {
            return Err(MinerError::InputError(format!(
                "Job id is {} bytes, at most 32 allowed",
                bytes.len()
            )));
        }
        let mut id = [0u8; 32];
        id[..bytes.len()].copy_from_slice(bytes);
        Ok(JobId(id))
    }

    /// Raw id bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        match std::str::from_utf8(&self.0[..end]) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => f.write_str(s),
            _ => f.write_str(&hex::encode(&self.0[..end])),
        }
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self)
    }
}

/// A unit of work published by the job source
///
/// Immutable once published; every worker hashes its own copy.
#[derive(Clone, PartialEq, Eq)]
pub struct Job {
    /// Pool job identifier echoed back with results
    pub job_id: JobId,
    blob: [u8; MAX_BLOB_SIZE],
    blob_size: usize,
    /// A digest qualifies when its 64-bit window is below this value
    pub target: u64,
    /// Pool that issued the job
    pub pool_id: usize,
    /// Top nonce byte is assigned by the pool
    pub nicehash: bool,
    /// No real job is available yet
    pub stalled: bool,
}

impl Job {
    /// Creates a hashable job
    ///
    /// # Errors
    /// Returns `InputError` if the blob cannot hold the nonce field or
    /// exceeds [`MAX_BLOB_SIZE`].
    pub fn new(
        job_id: JobId,
        blob: &[u8],
        target: u64,
        pool_id: usize,
        nicehash: bool,
    ) -> Result<Self, MinerError> {
        if blob.len() < NONCE_OFFSET + 4 || blob.len() > MAX_BLOB_SIZE {
            return Err(MinerError::InputError(format!(
                "Blob size {} outside [{}, {}]",
                blob.len(),
                NONCE_OFFSET + 4,
                MAX_BLOB_SIZE
            )));
        }
        let mut buf = [0u8; MAX_BLOB_SIZE];
        buf[..blob.len()].copy_from_slice(blob);
        Ok(Job {
            job_id,
            blob: buf,
            blob_size: blob.len(),
            target,
            pool_id,
            nicehash,
            stalled: false,
        })
    }

    /// Placeholder published before the first real job arrives
    pub fn stalled() -> Self {
        Job {
            job_id: JobId::default(),
            blob: [0u8; MAX_BLOB_SIZE],
            blob_size: 0,
            target: 0,
            pool_id: 0,
            nicehash: false,
            stalled: true,
        }
    }

    /// The header bytes to hash
    pub fn blob(&self) -> &[u8] {
        &self.blob[..self.blob_size]
    }

    /// Number of meaningful blob bytes
    pub fn blob_size(&self) -> usize {
        self.blob_size
    }

    /// Nonce currently embedded in the blob
    pub fn nonce(&self) -> u32 {
        read_nonce(&self.blob)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("job_id", &self.job_id)
            .field("blob", &hex::encode(self.blob()))
            .field("target", &format_args!("{:#018x}", self.target))
            .field("pool_id", &self.pool_id)
            .field("nicehash", &self.nicehash)
            .field("stalled", &self.stalled)
            .finish()
    }
}

/// A qualifying hash, handed to the result sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    /// Job the digest was computed against (may already be stale)
    pub job_id: JobId,
    /// Nonce that produced the digest
    pub nonce: u32,
    /// Full 32-byte digest
    pub digest: [u8; 32],
    /// Index of the worker thread that found it
    pub thread_id: usize,
    /// Pool that issued the job
    pub pool_id: usize,
}

/// Reads the nonce field of a blob
pub fn read_nonce(blob: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&blob[NONCE_OFFSET..NONCE_OFFSET + 4]);
    u32::from_le_bytes(raw)
}

/// Writes the nonce field of a blob
pub fn write_nonce(blob: &mut [u8], nonce: u32) {
    blob[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
}

/// The 64-bit window of a digest compared against the target
#[inline]
pub fn hash_value(digest: &[u8; 32]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[24..32]);
    u64::from_le_bytes(raw)
}

/// Whether a digest qualifies for `target` (strictly below)
#[inline]
pub fn meets_target(digest: &[u8; 32], target: u64) -> bool {
    hash_value(digest) < target
}

/// Target for a share difficulty
pub fn target_from_difficulty(difficulty: u64) -> u64 {
    if difficulty == 0 {
        u64::MAX
    } else {
        u64::MAX / difficulty
    }
}

/// Expands the 32-bit compact target sent by pools
pub fn target_from_compact(compact: u32) -> u64 {
    if compact == 0 {
        return 0;
    }
    u64::MAX / (u64::from(u32::MAX) / u64::from(compact))
}
