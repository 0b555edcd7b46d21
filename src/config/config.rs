// src/config/config.rs
use crate::{
    miner::algorithm::MAX_LANES,
    types::{AlgorithmType, SlowMemoryPolicy},
    utils::error::MinerError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest nonce window: the NiceHash counter space (low 24 bits)
pub const MAX_NONCE_CHUNK: u32 = 1 << 24;

/// Main configuration structure for the CPU mining engine
///
/// Contains the hash algorithm, the slow-memory policy, the AES override
/// and one [`ThreadConfig`] entry per worker thread to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// CryptoNight parameter set (e.g., "cryptonight", "cryptonight-v7")
    #[serde(default = "default_algorithm")]
    pub algorithm: AlgorithmType,

    /// What to do when huge pages or page locking are unavailable
    #[serde(default)]
    pub slow_memory: SlowMemoryPolicy,

    /// Force hardware (`true`) or software (`false`) AES; unset = detect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aes_override: Option<bool>,

    /// Nonces reserved per window, a power of two up to 2^24
    /// (rounded up to the thread's lane count; default: 4096)
    #[serde(default = "default_nonce_chunk")]
    pub nonce_chunk: u32,

    /// One entry per worker thread
    /// (default: one single-lane thread per logical CPU)
    #[serde(default = "default_cpu_threads")]
    pub cpu_threads: Vec<ThreadConfig>,
}

/// Settings for one worker thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadConfig {
    /// Hashes computed per call (1 = scalar)
    #[serde(default = "default_lanes", alias = "low_power_mode")]
    pub lanes: usize,

    /// Disable scratchpad prefetching
    #[serde(default)]
    pub no_prefetch: bool,

    /// CPU to pin the thread to; unset = let the OS schedule it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affine_to_cpu: Option<usize>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        ThreadConfig {
            lanes: default_lanes(),
            no_prefetch: false,
            affine_to_cpu: None,
        }
    }
}

fn default_algorithm() -> AlgorithmType {
    AlgorithmType::CryptoNight
}

fn default_nonce_chunk() -> u32 {
    4096
}

fn default_lanes() -> usize {
    1
}

fn default_cpu_threads() -> Vec<ThreadConfig> {
    (0..num_cpus::get()).map(|_| ThreadConfig::default()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: default_algorithm(),
            slow_memory: SlowMemoryPolicy::default(),
            aes_override: None,
            nonce_chunk: default_nonce_chunk(),
            cpu_threads: default_cpu_threads(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&config_str)
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(config_str: &str) -> Result<Self, MinerError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.cpu_threads.is_empty() {
            return Err(MinerError::ConfigError(
                "cpu_threads must contain at least one thread".into(),
            ));
        }
        if !self.nonce_chunk.is_power_of_two() || self.nonce_chunk > MAX_NONCE_CHUNK {
            return Err(MinerError::ConfigError(format!(
                "nonce_chunk must be a power of two no larger than {}, got {}",
                MAX_NONCE_CHUNK, self.nonce_chunk
            )));
        }
        for (i, thread) in self.cpu_threads.iter().enumerate() {
            if thread.lanes == 0 || thread.lanes > MAX_LANES {
                return Err(MinerError::ConfigError(format!(
                    "cpu_threads[{}]: lanes must be between 1 and {}, got {}",
                    i, MAX_LANES, thread.lanes
                )));
            }
        }
        Ok(())
    }

    /// Number of configured worker threads
    pub fn thread_count(&self) -> usize {
        self.cpu_threads.len()
    }

    /// Generates a configuration template string
    ///
    /// # Arguments
    /// * `threads` - Number of thread entries to emit, pinned to CPUs `0..threads`
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template(threads: usize) -> String {
        let mut template = String::new();
        template.push_str("# XMR CPU Miner Configuration\n\n");
        template.push_str("# Supported algorithms: cryptonight, cryptonight-v7\n");
        template.push_str("algorithm = \"cryptonight\"\n\n");
        template.push_str("# Huge pages / page locking policy:\n");
        template.push_str("#   never_use     - require huge pages and mlock, fail otherwise\n");
        template.push_str("#   no_mlck       - require huge pages, skip mlock\n");
        template.push_str("#   print_warning - try both, warn and fall back to normal memory\n");
        template.push_str("#   always_use    - always use normal memory\n");
        template.push_str("slow_memory = \"print_warning\"\n\n");
        template.push_str("# Uncomment to force hardware (true) or software (false) AES\n");
        template.push_str("# aes_override = false\n\n");
        template.push_str("# Nonces each thread reserves at a time (power of two, at most 16777216)\n");
        template.push_str("nonce_chunk = 4096\n\n");
        template.push_str("# One [[cpu_threads]] table per worker thread.\n");
        template.push_str("#   lanes         - hashes per call (1 = scalar, up to 128)\n");
        template.push_str("#   no_prefetch   - disable scratchpad prefetching\n");
        template.push_str("#   affine_to_cpu - CPU to pin to; remove the line for no affinity\n");

        for cpu in 0..threads.max(1) {
            template.push_str("\n[[cpu_threads]]\n");
            template.push_str("lanes = 1\n");
            template.push_str("no_prefetch = false\n");
            template.push_str(&format!("affine_to_cpu = {}\n", cpu));
        }

        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.algorithm, AlgorithmType::CryptoNight);
        assert_eq!(config.slow_memory, SlowMemoryPolicy::PrintWarning);
        assert_eq!(config.aes_override, None);
        assert_eq!(config.nonce_chunk, 4096);
        assert_eq!(config.thread_count(), num_cpus::get());
        assert!(config.cpu_threads.iter().all(|t| *t == ThreadConfig::default()));
    }

    #[test]
    fn parses_thread_table() {
        let config = Config::from_toml_str(
            r#"
            algorithm = "cryptonight-v7"
            slow_memory = "no_mlck"
            aes_override = false

            [[cpu_threads]]
            lanes = 2
            affine_to_cpu = 0

            [[cpu_threads]]
            low_power_mode = 5
            no_prefetch = true
            "#,
        )
        .unwrap();

        assert_eq!(config.algorithm, AlgorithmType::CryptoNightV7);
        assert_eq!(config.slow_memory, SlowMemoryPolicy::NoMlck);
        assert_eq!(config.aes_override, Some(false));
        assert_eq!(
            config.cpu_threads,
            vec![
                ThreadConfig { lanes: 2, no_prefetch: false, affine_to_cpu: Some(0) },
                ThreadConfig { lanes: 5, no_prefetch: true, affine_to_cpu: None },
            ]
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let too_wide = "[[cpu_threads]]\nlanes = 129\n";
        assert!(matches!(
            Config::from_toml_str(too_wide),
            Err(MinerError::ConfigError(_))
        ));

        let zero_chunk = "nonce_chunk = 0\n[[cpu_threads]]\n";
        assert!(Config::from_toml_str(zero_chunk).is_err());

        let no_threads = "cpu_threads = []\n";
        assert!(Config::from_toml_str(no_threads).is_err());

        let typo = "algoritm = \"cryptonight\"\n";
        assert!(Config::from_toml_str(typo).is_err());

        let unknown_algo = "algorithm = \"randomx\"\n";
        assert!(Config::from_toml_str(unknown_algo).is_err());
    }

    #[test]
    fn nonce_chunk_must_be_a_bounded_power_of_two() {
        let with_chunk = |nonce_chunk| Config {
            nonce_chunk,
            cpu_threads: vec![ThreadConfig { lanes: 2, ..ThreadConfig::default() }],
            ..Config::default()
        };
        assert!(with_chunk(1).validate().is_ok());
        assert!(with_chunk(4096).validate().is_ok());
        assert!(with_chunk(MAX_NONCE_CHUNK).validate().is_ok());

        for bad in [0, 3, 5000, MAX_NONCE_CHUNK * 2, u32::MAX] {
            assert!(
                matches!(with_chunk(bad).validate(), Err(MinerError::ConfigError(_))),
                "nonce_chunk {} accepted",
                bad
            );
        }
    }

    #[test]
    fn template_round_trips_through_loader() {
        let template = Config::generate_template(3);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(template.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.thread_count(), 3);
        assert_eq!(config.cpu_threads[2].affine_to_cpu, Some(2));
        assert_eq!(config.slow_memory, SlowMemoryPolicy::PrintWarning);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
