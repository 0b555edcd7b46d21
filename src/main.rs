// src/main.rs
use clap::Parser;
use crossbeam_channel::unbounded;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xmr_cpu_miner_rs::config::{self, Config, ThreadConfig};
use xmr_cpu_miner_rs::miner::{
    CryptoNightEngine, HashEngine, Job, JobId, MinerContext, self_test, start_workers,
    stop_workers, target_from_difficulty,
};
use xmr_cpu_miner_rs::utils::{init_bench_logging, init_logging};
use xmr_cpu_miner_rs::{MinerError, cli, stats};

/// Difficulty of the synthetic benchmark job
const BENCH_DIFFICULTY: u64 = 5000;

/// Main entry point for the XMR CPU miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Selftest(opts) => run_self_test(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Loads the configuration file, or the defaults when none is given
fn load_config(path: Option<&Path>) -> Result<Config, MinerError> {
    match path {
        Some(path) => config::load(path),
        None => Ok(Config::default()),
    }
}

/// Checks the selected hash functions against known digests
///
/// # Arguments
/// * `opts` - Self-test options
fn run_self_test(opts: cli::SelfTestOptions) -> Result<(), MinerError> {
    init_logging();

    let mut config = load_config(opts.config.as_deref())?;
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo;
    }

    let engine: Arc<dyn HashEngine> = Arc::new(CryptoNightEngine::new());
    if self_test(&engine, &config) {
        Ok(())
    } else {
        Err(MinerError::SelfTestFailed(format!(
            "{} on {}",
            config.algorithm,
            engine.name()
        )))
    }
}

/// Runs the worker engine on a synthetic job
///
/// # Arguments
/// * `opts` - Benchmark configuration options
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Runs the hash self-test
/// 3. Starts the configured worker threads and publishes the job
/// 4. Collects and reports performance statistics
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let mut config = load_config(opts.config.as_deref())?;
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo;
    }
    if let Some(policy) = opts.slow_memory {
        config.slow_memory = policy;
    }
    if let Some(threads) = opts.threads {
        config.cpu_threads = (0..threads)
            .map(|_| ThreadConfig {
                lanes: opts.lanes,
                ..ThreadConfig::default()
            })
            .collect();
    }
    config.validate()?;

    let engine: Arc<dyn HashEngine> = Arc::new(CryptoNightEngine::new());
    if !self_test(&engine, &config) {
        return Err(MinerError::SelfTestFailed(config.algorithm.to_string()));
    }

    let (result_sender, result_receiver) = unbounded();
    let ctx = MinerContext::new(Arc::new(config), engine, result_sender);
    let workers = start_workers(&ctx, 0)?;

    let reporter = stats::StatsReporter::new(
        workers.iter().map(|w| w.telemetry()).collect(),
        Duration::from_secs(10),
    );
    let reporting = reporter.start_reporting();

    log::info!(
        "Starting {} benchmark with {} threads for {} seconds",
        ctx.config.algorithm,
        workers.len(),
        opts.duration
    );

    let job = Job::new(
        JobId::from_bytes(b"benchmark")?,
        &[0u8; 76],
        target_from_difficulty(BENCH_DIFFICULTY),
        0,
        false,
    )?;
    let start_time = Instant::now();
    ctx.broadcast.publish(job);

    std::thread::sleep(Duration::from_secs(opts.duration));

    let mining_stats = reporter.get_stats();
    let elapsed = start_time.elapsed().as_secs_f64();
    reporter.stop();
    stop_workers(workers);
    let _ = reporting.join();

    let found = result_receiver.try_iter().count();

    // Report final results
    log::info!("Benchmark results:");
    for (thread, rates) in mining_stats.threads.iter().enumerate() {
        log::info!("Thread {}: {} H/s (60s)", thread, stats::format_rate(rates[1]));
    }
    log::info!("Total hashes: {}", mining_stats.hashes_total);
    log::info!(
        "Average hashrate: {:.2} H/s",
        mining_stats.hashes_total as f64 / elapsed.max(f64::EPSILON)
    );
    log::info!("Results meeting difficulty {}: {}", BENCH_DIFFICULTY, found);
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    init_logging();
    let config = config::generate_template(opts.threads);
    std::fs::write(&opts.output, config)?;
    log::info!("Wrote configuration template to {}", opts.output.display());
    Ok(())
}
