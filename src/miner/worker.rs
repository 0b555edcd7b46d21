// src/miner/worker.rs
//! Worker thread implementation
//!
//! A worker owns one OS thread, a private copy of the current job, one
//! scratchpad per lane and a contiguous buffer with one blob copy per lane.
//! It polls the broadcast sequence number between hashes, scans nonce
//! windows reserved from the shared cursor and pushes every qualifying
//! digest to the result sink.
//!
//! Lifecycle: `Starting → Affinity-Bound → (Stalled | Hashing)* → Quitting`.
//! The spawning thread blocks on a one-shot handshake until the worker has
//! bound its affinity and allocated its pads, so startup failures surface
//! as errors of [`WorkerThread::spawn`].

use crate::config::{Config, ThreadConfig};
use crate::miner::affinity::bind_current_thread;
use crate::miner::algorithm::{
    Capabilities, HashEngine, HashFn, MAX_LANES, has_hardware_aes, resolve_hardware_aes,
    select_hash_fn,
};
use crate::miner::broadcast::{JobBroadcast, PublishedJob};
use crate::miner::job::{JobResult, MAX_BLOB_SIZE, NICEHASH_PREFIX_MASK, meets_target, write_nonce};
use crate::miner::memory::{ScratchPad, alloc_lanes};
use crate::utils::error::MinerError;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sleep step while no job is available
const STALL_POLL: Duration = Duration::from_millis(100);

/// Everything a worker needs from the rest of the process
#[derive(Clone)]
pub struct MinerContext {
    /// Current job and nonce space
    pub broadcast: Arc<JobBroadcast>,
    /// Hash backend
    pub engine: Arc<dyn HashEngine>,
    /// Where qualifying results go
    pub results: Sender<JobResult>,
    /// Engine configuration
    pub config: Arc<Config>,
    hardware_aes: bool,
}

impl MinerContext {
    /// Creates a context with a fresh, stalled job broadcast
    pub fn new(config: Arc<Config>, engine: Arc<dyn HashEngine>, results: Sender<JobResult>) -> Self {
        let hardware_aes = resolve_hardware_aes(has_hardware_aes(), config.aes_override);
        MinerContext {
            broadcast: Arc::new(JobBroadcast::new()),
            engine,
            results,
            config,
            hardware_aes,
        }
    }

    /// Whether threads run the hardware AES variants
    pub fn hardware_aes(&self) -> bool {
        self.hardware_aes
    }

    /// Selection flags for a thread with the given prefetch setting
    pub fn capabilities(&self, prefetch: bool) -> Capabilities {
        Capabilities {
            algorithm: self.config.algorithm,
            hardware_aes: self.hardware_aes,
            prefetch,
        }
    }
}

/// Live counters of one worker
///
/// Written with relaxed stores at a fixed cadence by the worker, read at
/// any time by the statistics reporter.
#[derive(Debug, Default)]
pub struct WorkerTelemetry {
    hash_count: AtomicU64,
    timestamp_ms: AtomicU64,
}

impl WorkerTelemetry {
    /// Hashes computed so far
    pub fn hash_count(&self) -> u64 {
        self.hash_count.load(Ordering::Relaxed)
    }

    /// Wall-clock time of the last update in milliseconds, 0 before the first
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms.load(Ordering::Relaxed)
    }

    #[inline]
    fn record(&self, hashes: u64, timestamp_ms: u64) {
        self.hash_count.store(hashes, Ordering::Relaxed);
        self.timestamp_ms.store(timestamp_ms, Ordering::Relaxed);
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Nonce window size for `lanes`: `chunk` rounded up to a lane multiple
///
/// A batch therefore never straddles two reservations. Chunks too large to
/// round up are rounded down to the largest lane multiple instead.
pub fn chunk_for(lanes: usize, chunk: u32) -> u32 {
    let lanes = lanes.clamp(1, MAX_LANES) as u32;
    chunk
        .max(1)
        .div_ceil(lanes)
        .checked_mul(lanes)
        .unwrap_or(u32::MAX / lanes * lanes)
}

/// Handle to a running worker thread
pub struct WorkerThread {
    index: usize,
    lanes: usize,
    affinity: Option<usize>,
    telemetry: Arc<WorkerTelemetry>,
    quit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawns a worker and waits for its startup handshake
    ///
    /// The worker's initial job is the broadcast's current snapshot.
    ///
    /// # Errors
    /// - `AlgorithmError` if the engine lacks the selected variant
    /// - `ThreadSpawn` if the OS refuses a new thread
    /// - `MemoryAllocation` if the lane pads cannot be allocated
    /// - `WorkerStartup` if the thread dies before the handshake
    pub fn spawn(ctx: &MinerContext, index: usize, cfg: &ThreadConfig) -> Result<Self, MinerError> {
        let hash_fn = select_hash_fn(&ctx.engine, cfg.lanes, ctx.capabilities(!cfg.no_prefetch))?;
        let lanes = hash_fn.lanes();
        let affinity = cfg.affine_to_cpu;
        let policy = ctx.config.slow_memory;
        let pad_size = ctx.config.algorithm.memory();

        let telemetry = Arc::new(WorkerTelemetry::default());
        let quit = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), MinerError>>(1);

        let mut work = WorkLoop {
            index,
            broadcast: Arc::clone(&ctx.broadcast),
            results: ctx.results.clone(),
            hash_fn,
            pads: Vec::new(),
            telemetry: Arc::clone(&telemetry),
            quit: Arc::clone(&quit),
            nonce_chunk: chunk_for(lanes, ctx.config.nonce_chunk),
            job: ctx.broadcast.snapshot(),
            blobs: vec![0u8; MAX_BLOB_SIZE * lanes],
            digests: vec![[0u8; 32]; lanes],
            nonces: vec![0u32; lanes],
            iterations: 0,
        };

        let handle = thread::Builder::new()
            .name(format!("cpu-miner-{}", index))
            .spawn(move || {
                if let Some(cpu) = affinity {
                    if let Err(e) = bind_current_thread(cpu) {
                        log::warn!("WARNING setting affinity failed: {}", e);
                    }
                }

                match alloc_lanes(policy, pad_size, lanes) {
                    Ok(pads) => work.pads = pads,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                }
                let huge = work.pads.iter().filter(|p| p.is_huge_pages()).count();
                let locked = work.pads.iter().filter(|p| p.is_locked()).count();
                log::debug!(
                    "Worker {} scratchpads: {}/{} huge pages, {}/{} locked",
                    index,
                    huge,
                    lanes,
                    locked,
                    lanes
                );
                work.broadcast.mark_consumed();
                work.prepare_lanes();

                // Fires exactly once; the launcher may proceed from here
                let _ = ready_tx.send(Ok(()));
                drop(ready_tx);
                thread::yield_now();

                work.run();
            })
            .map_err(MinerError::ThreadSpawn)?;

        let startup = ready_rx.recv();
        match startup {
            Ok(Ok(())) => Ok(WorkerThread {
                index,
                lanes,
                affinity,
                telemetry,
                quit,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(MinerError::WorkerStartup(index))
            }
        }
    }

    /// Global thread index (offset included)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Lanes hashed per call
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// CPU the worker was asked to bind to
    pub fn affinity(&self) -> Option<usize> {
        self.affinity
    }

    /// Live counters for rate computation
    pub fn telemetry(&self) -> Arc<WorkerTelemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Asks the worker to stop after its current nonce window
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Relaxed);
    }

    /// Stops the worker and waits for it to exit
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.request_quit();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Worker {} panicked", self.index);
            }
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Nonces left in the current reservation
struct NonceWindow {
    next: u32,
    remaining: u32,
    prefix: Option<u32>,
}

impl NonceWindow {
    fn empty(prefix: Option<u32>) -> Self {
        NonceWindow {
            next: 0,
            remaining: 0,
            prefix,
        }
    }

    fn refill(&mut self, start: u32, len: u32) {
        self.next = start;
        self.remaining = len;
    }

    #[inline]
    fn take(&mut self) -> u32 {
        let nonce = match self.prefix {
            Some(prefix) => (prefix & NICEHASH_PREFIX_MASK) | (self.next & !NICEHASH_PREFIX_MASK),
            None => self.next,
        };
        self.next = self.next.wrapping_add(1);
        self.remaining -= 1;
        nonce
    }
}

/// State owned by the worker's OS thread
struct WorkLoop {
    index: usize,
    broadcast: Arc<JobBroadcast>,
    results: Sender<JobResult>,
    hash_fn: HashFn,
    pads: Vec<ScratchPad>,
    telemetry: Arc<WorkerTelemetry>,
    quit: Arc<AtomicBool>,
    nonce_chunk: u32,
    job: Arc<PublishedJob>,
    blobs: Vec<u8>,
    digests: Vec<[u8; 32]>,
    nonces: Vec<u32>,
    iterations: u64,
}

impl WorkLoop {
    fn run(mut self) {
        log::debug!(
            "Worker {} running {}x {}",
            self.index,
            self.hash_fn.lanes(),
            self.hash_fn.variant().algorithm
        );

        while !self.quitting() {
            if self.job.job.stalled {
                self.wait_for_job();
            } else {
                self.hash_job();
            }
            if self.quitting() {
                break;
            }
            self.consume_job();
        }

        self.record_stats();
        log::debug!("Worker {} stopped after {} hashes", self.index, self.telemetry.hash_count());
        // pads are released when `self` drops here
    }

    #[inline]
    fn quitting(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }

    /// Sleeps until a job newer than the local copy is published
    fn wait_for_job(&self) {
        while self.broadcast.current_sequence() == self.job.sequence && !self.quitting() {
            thread::sleep(STALL_POLL);
        }
    }

    /// Copies the newest job and rebuilds the lane blobs
    fn consume_job(&mut self) {
        self.job = self.broadcast.snapshot();
        self.broadcast.mark_consumed();
        self.prepare_lanes();
    }

    fn prepare_lanes(&mut self) {
        let blob = self.job.job.blob();
        let size = blob.len();
        for lane in 0..self.hash_fn.lanes() {
            self.blobs[lane * size..(lane + 1) * size].copy_from_slice(blob);
        }
    }

    fn record_stats(&self) {
        let hashes = self.iterations * self.hash_fn.lanes() as u64;
        self.telemetry.record(hashes, now_ms());
    }

    /// Scans nonce windows until the published sequence moves on
    fn hash_job(&mut self) {
        let lanes = self.hash_fn.lanes();
        let sequence = self.job.sequence;
        let size = self.job.job.blob_size();
        let target = self.job.job.target;
        let prefix = self.job.job.nicehash.then(|| self.job.job.nonce());
        let stats_mask = if lanes == 1 { 0xF } else { 0x7 };
        let mut window = NonceWindow::empty(prefix);

        while self.broadcast.current_sequence() == sequence {
            if self.iterations & stats_mask == 0 {
                self.record_stats();
            }

            if window.remaining < lanes as u32 {
                if self.quitting() {
                    return;
                }
                let start = self.broadcast.reserve_nonces(prefix, self.nonce_chunk);
                window.refill(start, self.nonce_chunk);
            }

            for lane in 0..lanes {
                let nonce = window.take();
                self.nonces[lane] = nonce;
                write_nonce(&mut self.blobs[lane * size..(lane + 1) * size], nonce);
            }

            if let Err(e) = self
                .hash_fn
                .compute(&self.blobs, size, &mut self.digests, &mut self.pads)
            {
                log::error!("Worker {} cannot hash job {}: {}", self.index, self.job.job.job_id, e);
                self.wait_for_job();
                return;
            }
            self.iterations += 1;

            for lane in 0..lanes {
                if meets_target(&self.digests[lane], target) {
                    self.submit(self.nonces[lane], self.digests[lane]);
                }
            }

            thread::yield_now();
        }
    }

    fn submit(&self, nonce: u32, digest: [u8; 32]) {
        let job = &self.job.job;
        log::debug!(
            "Worker {} found nonce {:#010x} for job {}",
            self.index,
            nonce,
            job.job_id
        );
        let result = JobResult {
            job_id: job.job_id,
            nonce,
            digest,
            thread_id: self.index,
            pool_id: job.pool_id,
        };
        if self.results.send(result).is_err() {
            log::warn!("Worker {}: result sink closed, dropping nonce {:#010x}", self.index, nonce);
        }
    }
}
