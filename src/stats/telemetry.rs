// src/stats/telemetry.rs
//! Per-thread hashrate history
//!
//! Each thread keeps a ring of `(hash count, timestamp)` samples taken by
//! the reporter. A rate over a window is the count delta between the
//! newest sample and the oldest sample inside the window, divided by
//! their time delta. Until the ring reaches back past the window start
//! the rate is unknown.

/// Rate windows reported by default: 10 seconds, 60 seconds, 15 minutes
pub const WINDOWS_MS: [u64; 3] = [10_000, 60_000, 900_000];

/// Samples kept per thread (about 34 minutes at one sample per 500ms)
const HISTORY_LEN: usize = 4096;

#[derive(Debug, Clone)]
struct History {
    counts: Vec<u64>,
    stamps: Vec<u64>,
    top: usize,
}

impl History {
    fn new() -> Self {
        History {
            counts: vec![0; HISTORY_LEN],
            stamps: vec![0; HISTORY_LEN],
            top: 0,
        }
    }
}

/// Hashrate history for a fixed set of threads
#[derive(Debug, Clone)]
pub struct Telemetry {
    threads: Vec<History>,
}

impl Telemetry {
    /// Creates empty histories for `threads` threads
    pub fn new(threads: usize) -> Self {
        Telemetry {
            threads: (0..threads).map(|_| History::new()).collect(),
        }
    }

    /// Number of tracked threads
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Records a sample; samples with a zero timestamp are ignored
    pub fn push_perf_value(&mut self, thread: usize, hash_count: u64, timestamp_ms: u64) {
        let Some(history) = self.threads.get_mut(thread) else {
            return;
        };
        if timestamp_ms == 0 {
            return;
        }
        let top = history.top;
        history.counts[top] = hash_count;
        history.stamps[top] = timestamp_ms;
        history.top = (top + 1) % HISTORY_LEN;
    }

    /// Hashes per second of `thread` over the last `window_ms`
    ///
    /// # Returns
    /// `None` while the history does not yet cover the window
    pub fn hashrate(&self, thread: usize, window_ms: u64, now_ms: u64) -> Option<f64> {
        let history = self.threads.get(thread)?;
        let since = now_ms.saturating_sub(window_ms);

        let mut latest: Option<(u64, u64)> = None;
        let mut earliest: Option<(u64, u64)> = None;
        let mut covered = false;

        for back in 1..=HISTORY_LEN {
            let idx = (history.top + HISTORY_LEN - back) % HISTORY_LEN;
            let stamp = history.stamps[idx];
            if stamp == 0 {
                break;
            }
            let sample = (history.counts[idx], stamp);
            latest.get_or_insert(sample);
            earliest = Some(sample);
            if stamp < since {
                covered = true;
                break;
            }
        }

        let ((last_count, last_stamp), (first_count, first_stamp)) = (latest?, earliest?);
        if !covered || last_stamp <= first_stamp {
            return None;
        }
        let hashes = last_count.saturating_sub(first_count) as f64;
        Some(hashes * 1000.0 / (last_stamp - first_stamp) as f64)
    }

    /// Sum of all known thread rates over `window_ms`
    ///
    /// # Returns
    /// `None` when no thread has a rate for the window yet
    pub fn total_hashrate(&self, window_ms: u64, now_ms: u64) -> Option<f64> {
        (0..self.threads.len())
            .filter_map(|t| self.hashrate(t, window_ms, now_ms))
            .fold(None, |acc, rate| Some(acc.unwrap_or(0.0) + rate))
    }
}
