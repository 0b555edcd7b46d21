// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported CryptoNight parameter sets
///
/// Both sets share the same scratchpad geometry; they differ in the
/// tweak applied to the main loop, which is why they cannot share
/// self-test vectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum AlgorithmType {
    /// Original CryptoNight (variant 0)
    ///
    /// Monero's proof-of-work until March 2018.
    #[clap(name = "cryptonight")]
    #[serde(rename = "cryptonight", alias = "cn")]
    CryptoNight,

    /// CryptoNight variant 7 (variant 1)
    ///
    /// Requires inputs of at least 43 bytes.
    #[clap(name = "cryptonight-v7")]
    #[serde(rename = "cryptonight-v7", alias = "cnv7")]
    CryptoNightV7,
}

const CN_MEMORY: usize = 2 * 1024 * 1024;

impl AlgorithmType {
    /// Scratchpad size in bytes
    pub fn memory(self) -> usize {
        match self {
            AlgorithmType::CryptoNight | AlgorithmType::CryptoNightV7 => CN_MEMORY,
        }
    }

    /// Smallest input the algorithm accepts
    pub fn min_input_len(self) -> usize {
        match self {
            AlgorithmType::CryptoNight => 0,
            AlgorithmType::CryptoNightV7 => 43,
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::CryptoNight => write!(f, "cryptonight"),
            AlgorithmType::CryptoNightV7 => write!(f, "cryptonight-v7"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cn" | "cryptonight" | "monero" => Ok(AlgorithmType::CryptoNight),
            "cnv7" | "cryptonight-v7" | "monero7" => Ok(AlgorithmType::CryptoNightV7),
            _ => Err(format!("Unknown algorithm: {}", s)),
        }
    }
}

/// Policy for scratchpads that cannot be placed in huge, locked pages
///
/// "Slow memory" is ordinary pageable heap memory.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowMemoryPolicy {
    /// Huge pages and mlock are mandatory; allocation failure is fatal
    #[serde(alias = "never")]
    NeverUse,
    /// Huge pages are mandatory, mlock is skipped; failure is fatal
    NoMlck,
    /// Try huge locked pages, warn and fall back to slow memory
    #[default]
    #[serde(alias = "warn")]
    PrintWarning,
    /// Always use slow memory
    #[serde(alias = "always")]
    AlwaysUse,
}

impl SlowMemoryPolicy {
    /// Whether an allocation failure under this policy aborts startup
    pub fn is_fatal(self) -> bool {
        matches!(self, SlowMemoryPolicy::NeverUse | SlowMemoryPolicy::NoMlck)
    }
}

impl fmt::Display for SlowMemoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlowMemoryPolicy::NeverUse => write!(f, "never_use"),
            SlowMemoryPolicy::NoMlck => write!(f, "no_mlck"),
            SlowMemoryPolicy::PrintWarning => write!(f, "print_warning"),
            SlowMemoryPolicy::AlwaysUse => write!(f, "always_use"),
        }
    }
}
