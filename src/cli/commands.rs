// src/cli/commands.rs
use crate::types::{AlgorithmType, SlowMemoryPolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// XMR CPU Miner - CryptoNight CPU mining engine in Rust
#[derive(Parser, Debug)]
#[command(name = "xmr-cpu-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (self-test, benchmark, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Verify the hash functions against known digests
    Selftest(SelfTestOptions),

    /// Run the worker threads on a synthetic job and report hashrates
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for the hash self-test
#[derive(Parser, Debug)]
pub struct SelfTestOptions {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Algorithm to test (overrides config)
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,
}

/// Options for running mining benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Algorithm to benchmark (overrides config)
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,

    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of unpinned threads to use (replaces the configured threads)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Lanes per thread when `--threads` is given
    #[arg(short, long, default_value_t = 1)]
    pub lanes: usize,

    /// Slow-memory policy (overrides config)
    #[arg(short, long)]
    pub slow_memory: Option<SlowMemoryPolicy>,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,

    /// Number of thread entries to generate
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Commands::command().debug_assert();
    }

    #[test]
    fn parses_benchmark_overrides() {
        let cli = Commands::try_parse_from([
            "xmr-cpu-miner-rs",
            "benchmark",
            "--algorithm",
            "cryptonight-v7",
            "-d",
            "5",
            "-t",
            "2",
            "-l",
            "3",
            "--slow-memory",
            "always-use",
        ])
        .unwrap();

        match cli.action {
            Action::Benchmark(opts) => {
                assert_eq!(opts.algorithm, Some(AlgorithmType::CryptoNightV7));
                assert_eq!(opts.duration, 5);
                assert_eq!(opts.threads, Some(2));
                assert_eq!(opts.lanes, 3);
                assert_eq!(opts.slow_memory, Some(SlowMemoryPolicy::AlwaysUse));
                assert!(opts.config.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn selftest_takes_optional_config() {
        let cli = Commands::try_parse_from(["xmr-cpu-miner-rs", "selftest", "-c", "miner.toml"]).unwrap();
        match cli.action {
            Action::Selftest(opts) => assert_eq!(opts.config, Some(PathBuf::from("miner.toml"))),
            other => panic!("unexpected action {:?}", other),
        }
    }
}
