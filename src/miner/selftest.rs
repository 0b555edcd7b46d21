// src/miner/selftest.rs
//! Startup self-test of the selected hash functions
//!
//! Every variant a worker might run is checked against known digests before
//! any worker starts. A mismatch means the build cannot be trusted to
//! produce valid shares.

use crate::config::Config;
use crate::miner::algorithm::{
    Capabilities, HashEngine, MAX_LANES, has_hardware_aes, resolve_hardware_aes, select_hash_fn,
};
use crate::miner::memory::{ScratchPad, alloc_lanes};
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use hex_literal::hex;
use std::sync::Arc;

const SHORT_INPUT: &[u8] = b"This is a test";
const SHORT_DIGEST: [u8; 32] =
    hex!("a084f01d1437a09c6985401b60d43554ae105802c5f5d8a9b3253649c0be6605");

/// Two 43-byte inputs back to back
const FOX_INPUTS: &[u8] =
    b"The quick brown fox jumps over the lazy dogThe quick brown fox jumps over the lazy log";
const FOX_LEN: usize = 43;
/// Digest of the second ("lazy log") input
const FOX_LOG_DIGEST: [u8; 32] =
    hex!("b477d502e4d8487f42dfe38eed73817ada91b7e263d29171b65c443a012a4122");

/// Runs the self-test and logs the outcome
///
/// # Returns
/// `true` when every checked variant produced the expected digests
pub fn self_test(engine: &Arc<dyn HashEngine>, config: &Config) -> bool {
    match run_self_test(engine, config) {
        Ok(()) => true,
        Err(MinerError::SelfTestFailed(detail)) => {
            log::error!(
                "Cryptonight hash self-test failed. This might be caused by bad compiler optimizations. ({})",
                detail
            );
            false
        }
        Err(e) => {
            log::error!("Cryptonight hash self-test could not run: {}", e);
            false
        }
    }
}

/// Runs the self-test
///
/// Scratchpads for the widest batch are allocated under the configured
/// slow-memory policy, so a fatal policy fails here first.
///
/// # Errors
/// - `SelfTestFailed` on the first digest mismatch
/// - `MemoryAllocation` if the pads cannot be allocated
/// - `AlgorithmError` if the engine lacks a variant
pub fn run_self_test(engine: &Arc<dyn HashEngine>, config: &Config) -> Result<(), MinerError> {
    let algorithm = config.algorithm;
    let mut pads = alloc_lanes(config.slow_memory, algorithm.memory(), MAX_LANES)?;
    let hardware_aes = resolve_hardware_aes(has_hardware_aes(), config.aes_override);

    // Software AES is always checked; hardware only when it will be used
    let aes_paths: &[bool] = if hardware_aes { &[true, false] } else { &[false] };
    let caps = |hardware_aes, prefetch| Capabilities {
        algorithm,
        hardware_aes,
        prefetch,
    };

    match algorithm {
        AlgorithmType::CryptoNight => {
            for &aes in aes_paths {
                for prefetch in [true, false] {
                    check(engine, caps(aes, prefetch), SHORT_INPUT, SHORT_INPUT.len(), &[SHORT_DIGEST], &mut pads)?;
                }
            }
            // Lane 1 has a known digest; lane 0 must match the scalar path
            let (dog, log) = FOX_INPUTS.split_at(FOX_LEN);
            check(engine, caps(false, false), log, FOX_LEN, &[FOX_LOG_DIGEST], &mut pads)?;
            let dog_digest = digest(engine, caps(false, false), dog, &mut pads)?;
            for prefetch in [true, false] {
                check(
                    engine,
                    caps(hardware_aes, prefetch),
                    FOX_INPUTS,
                    FOX_LEN,
                    &[dog_digest, FOX_LOG_DIGEST],
                    &mut pads,
                )?;
            }
            for lanes in 3..=5 {
                check(
                    engine,
                    caps(hardware_aes, true),
                    &SHORT_INPUT.repeat(lanes),
                    SHORT_INPUT.len(),
                    &vec![SHORT_DIGEST; lanes],
                    &mut pads,
                )?;
            }
        }
        AlgorithmType::CryptoNightV7 => {
            // No published vectors here: every path must agree with the
            // software scalar digest, and that digest must differ from the
            // original parameter set's
            let fox = &FOX_INPUTS[..FOX_LEN];
            let reference = digest(engine, caps(false, false), fox, &mut pads)?;
            let original = digest(
                engine,
                Capabilities {
                    algorithm: AlgorithmType::CryptoNight,
                    ..caps(false, false)
                },
                fox,
                &mut pads,
            )?;
            if reference == original {
                return Err(MinerError::SelfTestFailed(format!(
                    "{} digest equals the original CryptoNight digest",
                    algorithm
                )));
            }

            for &aes in aes_paths {
                for prefetch in [true, false] {
                    check(engine, caps(aes, prefetch), fox, FOX_LEN, &[reference], &mut pads)?;
                }
            }
            for lanes in 2..=5 {
                check(
                    engine,
                    caps(hardware_aes, true),
                    &fox.repeat(lanes),
                    FOX_LEN,
                    &vec![reference; lanes],
                    &mut pads,
                )?;
            }
        }
    }

    log::info!(
        "Hash self-test passed for {} ({}, hardware AES: {})",
        algorithm,
        engine.name(),
        hardware_aes
    );
    Ok(())
}

fn digest(
    engine: &Arc<dyn HashEngine>,
    caps: Capabilities,
    input: &[u8],
    pads: &mut [ScratchPad],
) -> Result<[u8; 32], MinerError> {
    let mut out = [[0u8; 32]; 1];
    select_hash_fn(engine, 1, caps)?.compute(input, input.len(), &mut out, pads)?;
    Ok(out[0])
}

fn check(
    engine: &Arc<dyn HashEngine>,
    caps: Capabilities,
    inputs: &[u8],
    input_len: usize,
    expected: &[[u8; 32]],
    pads: &mut [ScratchPad],
) -> Result<(), MinerError> {
    let lanes = expected.len();
    let hash_fn = select_hash_fn(engine, lanes, caps)?;
    let mut out = vec![[0u8; 32]; lanes];
    hash_fn.compute(inputs, input_len, &mut out, pads)?;

    match out.iter().zip(expected).position(|(got, want)| got != want) {
        None => Ok(()),
        Some(lane) => Err(MinerError::SelfTestFailed(format!(
            "{} {}-way (hardware AES: {}, prefetch: {}) lane {} produced {}",
            caps.algorithm,
            lanes,
            caps.hardware_aes,
            caps.prefetch,
            lane,
            hex::encode(out[lane])
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::CryptoNightEngine;
    use crate::miner::algorithm::mock::MockEngine;
    use crate::types::SlowMemoryPolicy;

    fn config(algorithm: AlgorithmType) -> Config {
        Config {
            algorithm,
            slow_memory: SlowMemoryPolicy::AlwaysUse,
            ..Config::default()
        }
    }

    #[test]
    fn real_engine_passes_for_both_algorithms() {
        let engine: Arc<dyn HashEngine> = Arc::new(CryptoNightEngine::new());
        run_self_test(&engine, &config(AlgorithmType::CryptoNight)).unwrap();
        assert!(self_test(&engine, &config(AlgorithmType::CryptoNightV7)));
    }

    #[test]
    fn real_engine_two_way_matches_scalar_and_known_lane() {
        let engine: Arc<dyn HashEngine> = Arc::new(CryptoNightEngine::new());
        let caps = Capabilities {
            algorithm: AlgorithmType::CryptoNight,
            hardware_aes: false,
            prefetch: true,
        };
        let mut pads = alloc_lanes(SlowMemoryPolicy::AlwaysUse, 4096, 2).unwrap();
        let (dog, log) = FOX_INPUTS.split_at(FOX_LEN);

        let dog_digest = digest(&engine, caps, dog, &mut pads).unwrap();
        assert_eq!(digest(&engine, caps, log, &mut pads).unwrap(), FOX_LOG_DIGEST);
        check(&engine, caps, FOX_INPUTS, FOX_LEN, &[dog_digest, FOX_LOG_DIGEST], &mut pads).unwrap();
    }

    #[test]
    fn wrong_digests_fail_the_test() {
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing());
        let err = run_self_test(&engine, &config(AlgorithmType::CryptoNight)).unwrap_err();
        assert!(matches!(err, MinerError::SelfTestFailed(_)));
        assert!(!self_test(&engine, &config(AlgorithmType::CryptoNight)));
    }

    #[test]
    fn missing_variant_fails_the_test() {
        let engine: Arc<dyn HashEngine> =
            Arc::new(MockEngine::mixing().without(AlgorithmType::CryptoNightV7));
        let err = run_self_test(&engine, &config(AlgorithmType::CryptoNightV7)).unwrap_err();
        assert!(matches!(err, MinerError::AlgorithmError(_)));
    }

    #[test]
    fn consistent_engine_passes_v7_equivalence() {
        // The mock is lane-independent and seeds on the algorithm
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing());
        run_self_test(&engine, &config(AlgorithmType::CryptoNightV7)).unwrap();
    }
}
