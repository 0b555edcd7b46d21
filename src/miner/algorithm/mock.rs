// src/miner/algorithm/mock.rs
//! Cheap deterministic engines for exercising the worker machinery

use crate::miner::algorithm::{HashEngine, HashVariant};
use crate::miner::job::{NONCE_OFFSET, read_nonce};
use crate::miner::memory::ScratchPad;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy)]
enum Mode {
    /// FNV-1a spread over the whole digest
    Mixing,
    /// Target window equals the blob's nonce
    NonceEcho,
}

pub(crate) struct MockEngine {
    mode: Mode,
    unsupported: Option<AlgorithmType>,
    pub(crate) hashes: AtomicU64,
}

impl MockEngine {
    pub(crate) fn mixing() -> Self {
        MockEngine {
            mode: Mode::Mixing,
            unsupported: None,
            hashes: AtomicU64::new(0),
        }
    }

    pub(crate) fn nonce_echo() -> Self {
        MockEngine {
            mode: Mode::NonceEcho,
            ..Self::mixing()
        }
    }

    pub(crate) fn without(mut self, algorithm: AlgorithmType) -> Self {
        self.unsupported = Some(algorithm);
        self
    }
}

fn fnv1a(seed: u64, data: &[u8]) -> u64 {
    data.iter().fold(seed, |h, b| (h ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3))
}

impl HashEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, variant: HashVariant) -> bool {
        self.unsupported != Some(variant.algorithm)
    }

    fn hash(
        &self,
        variant: HashVariant,
        input: &[u8],
        pad: &mut ScratchPad,
        out: &mut [u8; 32],
    ) -> Result<(), MinerError> {
        self.hashes.fetch_add(1, Ordering::Relaxed);
        // Touch the lane's pad like a real backend would
        pad.as_mut_slice()[0] ^= 1;

        let seed = 0xcbf2_9ce4_8422_2325 ^ variant.algorithm as u64;
        for (i, word) in out.chunks_exact_mut(8).enumerate() {
            word.copy_from_slice(&fnv1a(seed.wrapping_add(i as u64), input).to_le_bytes());
        }
        if let Mode::NonceEcho = self.mode {
            if input.len() >= NONCE_OFFSET + 4 {
                out[24..32].copy_from_slice(&u64::from(read_nonce(input)).to_le_bytes());
            }
        }
        Ok(())
    }
}
