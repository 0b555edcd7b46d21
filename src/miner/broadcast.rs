// src/miner/broadcast.rs
//! Process-wide current job and shared nonce space
//!
//! One writer (the job source) publishes, every worker polls. The job
//! payload lives behind an [`ArcSwap`] so readers never block and never see
//! a half-written job; the sequence counter is bumped only after the new
//! snapshot has been stored.

use crate::miner::job::{Job, NICEHASH_PREFIX_MASK};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A job together with the sequence number it was published under
#[derive(Debug, Clone)]
pub struct PublishedJob {
    /// Sequence number, strictly increasing per publish
    pub sequence: u64,
    /// The job payload
    pub job: Job,
}

/// Writer-side bookkeeping, never touched by workers
#[derive(Default)]
struct PublishState {
    pool_id: usize,
    saved_nonces: HashMap<usize, u32>,
}

/// Shared current-job state
pub struct JobBroadcast {
    /// Current job snapshot (atomically swappable)
    current: ArcSwap<PublishedJob>,
    /// Last published sequence number
    sequence: AtomicU64,
    /// Next unreserved nonce
    nonce_cursor: AtomicU32,
    /// Number of job copies taken by workers
    consumed: AtomicU64,
    publish: Mutex<PublishState>,
}

impl JobBroadcast {
    /// Creates the broadcast holding a stalled placeholder at sequence 0
    pub fn new() -> Self {
        JobBroadcast {
            current: ArcSwap::from_pointee(PublishedJob {
                sequence: 0,
                job: Job::stalled(),
            }),
            sequence: AtomicU64::new(0),
            nonce_cursor: AtomicU32::new(0),
            consumed: AtomicU64::new(0),
            publish: Mutex::new(PublishState::default()),
        }
    }

    /// Replaces the current job
    ///
    /// When the job comes from a different pool than the previous one, the
    /// old pool's nonce cursor is saved and the new pool's cursor restored,
    /// so switching back to a pool never rescans nonces it already handed out.
    ///
    /// # Returns
    /// The sequence number the job was published under
    pub fn publish(&self, job: Job) -> u64 {
        let mut state = self.publish.lock().unwrap_or_else(|e| e.into_inner());

        if job.pool_id != state.pool_id {
            let resumed = state.saved_nonces.remove(&job.pool_id).unwrap_or(0);
            let previous = self.nonce_cursor.swap(resumed, Ordering::SeqCst);
            let old_pool = state.pool_id;
            state.saved_nonces.insert(old_pool, previous);
            state.pool_id = job.pool_id;
            log::debug!(
                "Pool switch {} -> {}, nonce cursor {:#010x} -> {:#010x}",
                old_pool,
                job.pool_id,
                previous,
                resumed
            );
        }

        let sequence = self.sequence.load(Ordering::Relaxed) + 1;
        self.current.store(Arc::new(PublishedJob { sequence, job }));
        // Payload first, then the number readers poll on
        self.sequence.store(sequence, Ordering::Release);
        sequence
    }

    /// Sequence number of the newest job (hot-loop poll)
    #[inline]
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// The current job snapshot
    ///
    /// The returned snapshot carries its own sequence number, which is
    /// at least the value `current_sequence` returned before the call.
    pub fn snapshot(&self) -> Arc<PublishedJob> {
        self.current.load_full()
    }

    /// Reserves `chunk` nonces for the caller's exclusive use
    ///
    /// # Arguments
    /// * `nicehash_prefix` - In NiceHash mode, the nonce whose top byte the
    ///   pool assigned; only the low 24 bits are taken from the shared cursor
    /// * `chunk` - Number of nonces to reserve
    ///
    /// # Returns
    /// The first nonce of the window `[start, start + chunk)`
    #[inline]
    pub fn reserve_nonces(&self, nicehash_prefix: Option<u32>, chunk: u32) -> u32 {
        let start = self.nonce_cursor.fetch_add(chunk, Ordering::Relaxed);
        match nicehash_prefix {
            Some(prefix) => (prefix & NICEHASH_PREFIX_MASK) | (start & !NICEHASH_PREFIX_MASK),
            None => start,
        }
    }

    /// Records that a worker copied the current job
    #[inline]
    pub fn mark_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of job copies taken so far
    pub fn consumed_count(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }
}

impl Default for JobBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::job::{JobId, NONCE_OFFSET};
    use rayon::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn job_for(seq_tag: u64, pool_id: usize) -> Job {
        let mut blob = [0u8; 76];
        blob[..8].copy_from_slice(&seq_tag.to_le_bytes());
        blob[NONCE_OFFSET + 4..NONCE_OFFSET + 12].copy_from_slice(&seq_tag.to_le_bytes());
        blob[68..76].copy_from_slice(&seq_tag.to_le_bytes());
        let id = JobId::from_bytes(&seq_tag.to_le_bytes()).unwrap();
        Job::new(id, &blob, seq_tag, pool_id, false).unwrap()
    }

    #[test]
    fn starts_stalled_at_sequence_zero() {
        let broadcast = JobBroadcast::new();
        let snap = broadcast.snapshot();
        assert_eq!(snap.sequence, 0);
        assert!(snap.job.stalled);
        assert_eq!(broadcast.current_sequence(), 0);
    }

    #[test]
    fn publish_bumps_sequence_and_replaces_payload() {
        let broadcast = JobBroadcast::new();
        assert_eq!(broadcast.publish(job_for(7, 0)), 1);
        assert_eq!(broadcast.publish(job_for(9, 0)), 2);
        let snap = broadcast.snapshot();
        assert_eq!(snap.sequence, 2);
        assert_eq!(snap.job.target, 9);
    }

    #[test]
    fn concurrent_reservations_partition_the_nonce_space() {
        const CHUNK: u32 = 4096;
        const CALLS: usize = 2_000;
        let broadcast = JobBroadcast::new();

        let starts: Vec<u32> = (0..CALLS)
            .into_par_iter()
            .map(|_| broadcast.reserve_nonces(None, CHUNK))
            .collect();

        let mut seen = HashSet::with_capacity(CALLS * CHUNK as usize);
        for start in &starts {
            for n in *start..*start + CHUNK {
                assert!(seen.insert(n), "nonce {} handed out twice", n);
            }
        }
        assert_eq!(seen.len(), CALLS * CHUNK as usize);
        // No gaps: the windows tile [0, CALLS * CHUNK)
        assert_eq!(*seen.iter().max().unwrap(), (CALLS as u32) * CHUNK - 1);
    }

    #[test]
    fn nicehash_keeps_pool_prefix() {
        let broadcast = JobBroadcast::new();
        let a = broadcast.reserve_nonces(Some(0xAB00_1234), 16);
        let b = broadcast.reserve_nonces(Some(0xAB00_0000), 16);
        assert_eq!(a, 0xAB00_0000);
        assert_eq!(b, 0xAB00_0010);
    }

    #[test]
    fn pool_switch_saves_and_restores_cursor() {
        let broadcast = JobBroadcast::new();
        broadcast.publish(job_for(1, 0));
        broadcast.reserve_nonces(None, 100);

        broadcast.publish(job_for(2, 1));
        assert_eq!(broadcast.reserve_nonces(None, 10), 0);

        broadcast.publish(job_for(3, 0));
        assert_eq!(broadcast.reserve_nonces(None, 10), 100);

        // Same pool again: the cursor keeps running
        broadcast.publish(job_for(4, 0));
        assert_eq!(broadcast.reserve_nonces(None, 10), 110);
    }

    #[test]
    fn readers_never_see_sequence_ahead_of_payload() {
        const JOBS: u64 = 5_000;
        let broadcast = Arc::new(JobBroadcast::new());
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let broadcast = broadcast.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut checks = 0u64;
                    while !done.load(Ordering::Acquire) {
                        let seen = broadcast.current_sequence();
                        let snap = broadcast.snapshot();
                        assert!(snap.sequence >= seen, "payload older than sequence");
                        if !snap.job.stalled {
                            // The publisher tags every job with its sequence
                            let blob = snap.job.blob();
                            let tag = |r: std::ops::Range<usize>| {
                                u64::from_le_bytes(blob[r].try_into().unwrap())
                            };
                            assert_eq!(tag(0..8), snap.sequence);
                            assert_eq!(tag(NONCE_OFFSET + 4..NONCE_OFFSET + 12), snap.sequence);
                            assert_eq!(tag(68..76), snap.sequence);
                            assert_eq!(snap.job.target, snap.sequence);
                        }
                        checks += 1;
                    }
                    checks
                })
            })
            .collect();

        for tag in 1..=JOBS {
            assert_eq!(broadcast.publish(job_for(tag, 0)), tag);
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(broadcast.current_sequence(), JOBS);
    }

    #[test]
    fn consumed_counter_is_observational() {
        let broadcast = JobBroadcast::new();
        broadcast.mark_consumed();
        broadcast.mark_consumed();
        assert_eq!(broadcast.consumed_count(), 2);
    }
}
