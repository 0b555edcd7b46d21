// src/stats/reporter.rs
use crate::miner::worker::{WorkerTelemetry, now_ms};
use crate::stats::telemetry::{Telemetry, WINDOWS_MS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// How often worker counters are sampled into the history
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Statistics related to mining performance
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Total number of hashes computed by all threads
    pub hashes_total: u64,
    /// Total hashrate over 10 seconds, 60 seconds and 15 minutes
    pub totals: [Option<f64>; 3],
    /// Per-thread hashrates over the same windows
    pub threads: Vec<[Option<f64>; 3]>,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently used by the system (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Samples worker counters and reports hashrates
pub struct StatsReporter {
    /// Live counters, one per worker thread
    workers: Arc<Vec<Arc<WorkerTelemetry>>>,
    /// Sampled history
    telemetry: Arc<Mutex<Telemetry>>,
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
    /// Interval at which stats are reported
    report_interval: Duration,
    /// Cleared to stop the reporting thread
    running: Arc<AtomicBool>,
}

impl Clone for StatsReporter {
    fn clone(&self) -> Self {
        StatsReporter {
            workers: self.workers.clone(),
            telemetry: self.telemetry.clone(),
            system: System::new(),
            components: Components::new_with_refreshed_list(),
            report_interval: self.report_interval,
            running: self.running.clone(),
        }
    }
}

/// Formats an optional rate, `n/a` while unknown
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.1}", rate),
        None => "n/a".to_string(),
    }
}

impl StatsReporter {
    /// Creates a reporter over the given worker counters
    ///
    /// # Arguments
    /// * `workers` - One telemetry handle per worker, in thread order
    /// * `report_interval` - How often to log statistics
    pub fn new(workers: Vec<Arc<WorkerTelemetry>>, report_interval: Duration) -> Self {
        let threads = workers.len();
        StatsReporter {
            workers: Arc::new(workers),
            telemetry: Arc::new(Mutex::new(Telemetry::new(threads))),
            system: System::new(),
            components: Components::new_with_refreshed_list(),
            report_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Copies every worker's current counters into the history
    pub fn sample(&self) {
        let mut telemetry = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
        for (thread, worker) in self.workers.iter().enumerate() {
            // Timestamp first: a count never pairs with a newer stamp
            let timestamp = worker.timestamp_ms();
            let count = worker.hash_count();
            telemetry.push_perf_value(thread, count, timestamp);
        }
    }

    /// Gets the current mining statistics
    ///
    /// # Returns
    /// Hash totals and rates as of the last sample
    pub fn get_stats(&self) -> MiningStats {
        let now = now_ms();
        let telemetry = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());

        let threads = (0..telemetry.thread_count())
            .map(|t| WINDOWS_MS.map(|window| telemetry.hashrate(t, window, now)))
            .collect();

        MiningStats {
            hashes_total: self.workers.iter().map(|w| w.hash_count()).sum(),
            totals: WINDOWS_MS.map(|window| telemetry.total_hashrate(window, now)),
            threads,
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    ///
    /// # Returns
    /// A snapshot of the current hardware statistics
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// Logs one per-thread and total hashrate report
    pub fn log_report(&mut self) {
        let stats = self.get_stats();
        let hw_stats = self.get_hardware_stats();

        for (thread, rates) in stats.threads.iter().enumerate() {
            log::debug!(
                "Thread {} (10s/60s/15m): {} {} {} H/s",
                thread,
                format_rate(rates[0]),
                format_rate(rates[1]),
                format_rate(rates[2])
            );
        }
        log::info!(
            "Totals (10s/60s/15m): {} {} {} H/s | Hashes: {} | CPU: {:.1}% | Temp: {:.1}°C",
            format_rate(stats.totals[0]),
            format_rate(stats.totals[1]),
            format_rate(stats.totals[2]),
            stats.hashes_total,
            hw_stats.cpu_usage,
            hw_stats.temperature
        );
    }

    /// Starts the periodic sampling and reporting of statistics
    ///
    /// This spawns a background thread that samples workers every 500ms and
    /// logs stats at the configured interval until [`stop`](Self::stop).
    pub fn start_reporting(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::Relaxed);
        let mut reporter = self.clone();

        std::thread::spawn(move || {
            let mut last_report = Instant::now();
            while reporter.running.load(Ordering::Relaxed) {
                std::thread::sleep(SAMPLE_INTERVAL);
                reporter.sample();

                if last_report.elapsed() >= reporter.report_interval {
                    reporter.log_report();
                    last_report = Instant::now();
                }
            }
        })
    }

    /// Asks the reporting thread to exit after its current sleep
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
