// src/miner/starter.rs
//! Starting and stopping the configured worker threads

use crate::miner::worker::{MinerContext, WorkerThread};
use crate::utils::error::MinerError;

/// Starts one worker per configured thread, in order
///
/// Each worker is fully started (affinity bound, pads allocated) before
/// the next one is spawned. Global indices are `thread_offset + i`.
///
/// # Errors
/// The first startup error; workers already running are stopped first.
pub fn start_workers(ctx: &MinerContext, thread_offset: usize) -> Result<Vec<WorkerThread>, MinerError> {
    let threads = &ctx.config.cpu_threads;
    let mut workers = Vec::with_capacity(threads.len());

    for (i, cfg) in threads.iter().enumerate() {
        let index = thread_offset + i;
        match cfg.affine_to_cpu {
            Some(cpu) => {
                if cfg!(not(target_os = "linux")) {
                    log::warn!("WARNING: thread affinity is not supported on this platform");
                }
                log::info!("Starting {}x thread, affinity: {}.", cfg.lanes, cpu);
            }
            None => log::info!("Starting {}x thread, no affinity.", cfg.lanes),
        }

        match WorkerThread::spawn(ctx, index, cfg) {
            Ok(worker) => workers.push(worker),
            Err(e) => {
                log::error!("Thread {} failed to start: {}", index, e);
                stop_workers(workers);
                return Err(e);
            }
        }
    }

    log::info!(
        "{} worker threads running {} on {}",
        workers.len(),
        ctx.config.algorithm,
        ctx.engine.name()
    );
    Ok(workers)
}

/// Signals every worker to quit, then joins them
pub fn stop_workers(workers: Vec<WorkerThread>) {
    for worker in &workers {
        worker.request_quit();
    }
    for worker in workers {
        worker.join();
    }
}
