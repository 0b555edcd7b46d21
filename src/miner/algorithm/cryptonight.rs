// src/miner/algorithm/cryptonight.rs
//! CryptoNight backend
//!
//! Wraps the `cryptonight-rs` crate. The library keeps its own scratchpad
//! per call and picks its AES code path itself, so the lane pad and the
//! AES/prefetch axes of a [`HashVariant`] only select the table entry here;
//! the digest is the same for every entry of one algorithm.

use crate::miner::algorithm::{HashEngine, HashVariant};
use crate::miner::memory::ScratchPad;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use cryptonight::cryptonight;

/// CryptoNight engine backed by `cryptonight-rs`
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoNightEngine;

impl CryptoNightEngine {
    /// Creates the engine
    pub fn new() -> Self {
        CryptoNightEngine
    }

    /// Library variant number for a parameter set
    ///
    /// - `0` original CryptoNight
    /// - `1` CryptoNight V7
    fn variant_id(algorithm: AlgorithmType) -> i32 {
        match algorithm {
            AlgorithmType::CryptoNight => 0,
            AlgorithmType::CryptoNightV7 => 1,
        }
    }
}

impl HashEngine for CryptoNightEngine {
    fn name(&self) -> &str {
        "cryptonight-rs"
    }

    fn hash(
        &self,
        variant: HashVariant,
        input: &[u8],
        _pad: &mut ScratchPad,
        out: &mut [u8; 32],
    ) -> Result<(), MinerError> {
        // The C core exits the process on short V7 inputs
        let min_len = variant.algorithm.min_input_len();
        if input.len() < min_len {
            return Err(MinerError::InputError(format!(
                "{} input is {} bytes, at least {} required",
                variant.algorithm,
                input.len(),
                min_len
            )));
        }
        let digest = cryptonight(input, input.len(), Self::variant_id(variant.algorithm));
        out.copy_from_slice(&digest[..32]);
        Ok(())
    }
}
