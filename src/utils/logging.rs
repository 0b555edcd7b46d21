// src/utils/logging.rs
//! Logging configuration
//!
//! Mining threads log through the `log` facade; this module wires it to
//! `env_logger` with a compact single-line format. `RUST_LOG` always
//! wins over the defaults chosen here.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging at Info level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    init_with_default(LevelFilter::Info);
}

/// Initializes logging for benchmark runs
///
/// Defaults to Debug so per-thread startup details are visible.
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(level: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(level);
    } else {
        builder.parse_env("RUST_LOG");
    }

    // A second init (tests, embedding) must not abort the process
    let _ = builder.try_init();
}

/// Base builder: `[ts LEVEL module:line] message` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_millis();
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                record.level(),
                record.module_path().unwrap_or_default(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
