// src/miner/algorithm/mod.rs
//! Hash backends and per-thread hash function selection
//!
//! A backend implements [`HashEngine`]. Each worker resolves, once at
//! startup, the concrete [`HashFn`] it will call for its whole life from
//! three independent axes: hardware vs software AES, prefetch on/off, and
//! the CryptoNight parameter set.

/// CryptoNight backend built on the `cryptonight-rs` crate
pub mod cryptonight;

#[cfg(test)]
pub(crate) mod mock;

use crate::miner::memory::ScratchPad;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::Arc;

pub use self::cryptonight::CryptoNightEngine;

/// Widest supported lane count
pub const MAX_LANES: usize = 128;

/// One concrete hash implementation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HashVariant {
    /// Parameter set
    pub algorithm: AlgorithmType,
    /// Use the AES-NI code path
    pub hardware_aes: bool,
    /// Prefetch scratchpad lines ahead of use
    pub prefetch: bool,
}

const fn variant(algorithm: AlgorithmType, hardware_aes: bool, prefetch: bool) -> HashVariant {
    HashVariant {
        algorithm,
        hardware_aes,
        prefetch,
    }
}

/// All variants, indexed by `prefetch | software_aes << 1 | algorithm_b << 2`
pub const VARIANT_TABLE: [HashVariant; 8] = [
    variant(AlgorithmType::CryptoNight, true, false),
    variant(AlgorithmType::CryptoNight, true, true),
    variant(AlgorithmType::CryptoNight, false, false),
    variant(AlgorithmType::CryptoNight, false, true),
    variant(AlgorithmType::CryptoNightV7, true, false),
    variant(AlgorithmType::CryptoNightV7, true, true),
    variant(AlgorithmType::CryptoNightV7, false, false),
    variant(AlgorithmType::CryptoNightV7, false, true),
];

/// What the running machine and configuration allow a thread to use
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Active parameter set
    pub algorithm: AlgorithmType,
    /// AES-NI is available and not disabled
    pub hardware_aes: bool,
    /// Prefetching is enabled for this thread
    pub prefetch: bool,
}

impl Capabilities {
    fn table_index(&self) -> usize {
        let algorithm_b = matches!(self.algorithm, AlgorithmType::CryptoNightV7);
        usize::from(self.prefetch) | usize::from(!self.hardware_aes) << 1 | usize::from(algorithm_b) << 2
    }
}

/// Interface to a memory-hard hash backend
///
/// Implementations must be pure: the same variant and input always give
/// the same digest, whatever the lane or pad used.
pub trait HashEngine: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Whether the backend can run `variant`
    fn supports(&self, _variant: HashVariant) -> bool {
        true
    }

    /// Hashes one input into `out`
    ///
    /// # Errors
    /// `InputError` if `input` is shorter than the algorithm accepts
    fn hash(
        &self,
        variant: HashVariant,
        input: &[u8],
        pad: &mut ScratchPad,
        out: &mut [u8; 32],
    ) -> Result<(), MinerError>;

    /// Hashes `out.len()` inputs laid out back to back, `input_len` bytes each
    ///
    /// Backends with an interleaved implementation override this; the
    /// default runs the lanes one after another.
    fn hash_batch(
        &self,
        variant: HashVariant,
        inputs: &[u8],
        input_len: usize,
        out: &mut [[u8; 32]],
        pads: &mut [ScratchPad],
    ) -> Result<(), MinerError> {
        for ((input, digest), pad) in inputs
            .chunks_exact(input_len)
            .zip(out.iter_mut())
            .zip(pads.iter_mut())
        {
            self.hash(variant, input, pad, digest)?;
        }
        Ok(())
    }
}

/// A resolved hash function: backend, variant and lane width
#[derive(Clone)]
pub struct HashFn {
    engine: Arc<dyn HashEngine>,
    variant: HashVariant,
    lanes: usize,
}

impl HashFn {
    /// The variant this function runs
    pub fn variant(&self) -> HashVariant {
        self.variant
    }

    /// Number of inputs hashed per call
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Hashes `lanes()` consecutive inputs of `input_len` bytes each
    ///
    /// # Errors
    /// `InputError` if `input_len` is below the algorithm's minimum or the
    /// buffers hold fewer than `lanes()` inputs, digests or pads
    #[inline]
    pub fn compute(
        &self,
        inputs: &[u8],
        input_len: usize,
        out: &mut [[u8; 32]],
        pads: &mut [ScratchPad],
    ) -> Result<(), MinerError> {
        let min_len = self.variant.algorithm.min_input_len();
        if input_len < min_len || input_len == 0 {
            return Err(MinerError::InputError(format!(
                "{} needs inputs of at least {} bytes, got {}",
                self.variant.algorithm,
                min_len.max(1),
                input_len
            )));
        }
        let n = self.lanes;
        if inputs.len() < input_len * n || out.len() < n || pads.len() < n {
            return Err(MinerError::InputError(format!(
                "{}-way hash given {} input bytes, {} digests and {} pads",
                n,
                inputs.len(),
                out.len(),
                pads.len()
            )));
        }

        if n == 1 {
            self.engine
                .hash(self.variant, &inputs[..input_len], &mut pads[0], &mut out[0])
        } else {
            self.engine.hash_batch(
                self.variant,
                &inputs[..input_len * n],
                input_len,
                &mut out[..n],
                &mut pads[..n],
            )
        }
    }
}

fn resolve(
    engine: &Arc<dyn HashEngine>,
    caps: Capabilities,
    lanes: usize,
) -> Result<HashFn, MinerError> {
    let variant = VARIANT_TABLE[caps.table_index()];
    if !engine.supports(variant) {
        return Err(MinerError::AlgorithmError(format!(
            "{} does not implement {} (hardware AES: {}, prefetch: {})",
            engine.name(),
            variant.algorithm,
            variant.hardware_aes,
            variant.prefetch
        )));
    }
    Ok(HashFn {
        engine: Arc::clone(engine),
        variant,
        lanes,
    })
}

/// Selects the single-lane hash function for `caps`
pub fn func_selector(engine: &Arc<dyn HashEngine>, caps: Capabilities) -> Result<HashFn, MinerError> {
    resolve(engine, caps, 1)
}

/// Selects the batched hash function for `lanes`, clamped to `[2, MAX_LANES]`
pub fn func_multi_selector(
    engine: &Arc<dyn HashEngine>,
    lanes: usize,
    caps: Capabilities,
) -> Result<HashFn, MinerError> {
    resolve(engine, caps, lanes.clamp(2, MAX_LANES))
}

/// Selects the hash function for a thread of `lanes` lanes
pub fn select_hash_fn(
    engine: &Arc<dyn HashEngine>,
    lanes: usize,
    caps: Capabilities,
) -> Result<HashFn, MinerError> {
    if lanes <= 1 {
        func_selector(engine, caps)
    } else {
        func_multi_selector(engine, lanes, caps)
    }
}

/// Whether this CPU implements AES-NI
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn has_hardware_aes() -> bool {
    std::is_x86_feature_detected!("aes")
}

/// Whether this CPU implements the ARMv8 AES extension
#[cfg(target_arch = "aarch64")]
pub fn has_hardware_aes() -> bool {
    std::arch::is_aarch64_feature_detected!("aes")
}

/// Hardware AES is not detected on this architecture
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
pub fn has_hardware_aes() -> bool {
    false
}

/// Applies a configured AES override to the detected capability
///
/// Forcing hardware AES on a CPU without it falls back to software.
pub fn resolve_hardware_aes(detected: bool, aes_override: Option<bool>) -> bool {
    match aes_override {
        Some(true) if !detected => {
            log::warn!("Hardware AES requested but this CPU lacks it, using software AES");
            false
        }
        Some(forced) => forced,
        None => detected,
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockEngine;
    use super::*;
    use crate::miner::memory::alloc_lanes;
    use crate::types::SlowMemoryPolicy;

    fn caps(algorithm: AlgorithmType, hardware_aes: bool, prefetch: bool) -> Capabilities {
        Capabilities {
            algorithm,
            hardware_aes,
            prefetch,
        }
    }

    #[test]
    fn table_is_keyed_by_prefetch_aes_algorithm_bits() {
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing());
        for algorithm in [AlgorithmType::CryptoNight, AlgorithmType::CryptoNightV7] {
            for hardware_aes in [true, false] {
                for prefetch in [true, false] {
                    let f = func_selector(&engine, caps(algorithm, hardware_aes, prefetch)).unwrap();
                    assert_eq!(f.variant(), variant(algorithm, hardware_aes, prefetch));
                    assert_eq!(f.lanes(), 1);
                }
            }
        }
        let idx = caps(AlgorithmType::CryptoNightV7, false, true).table_index();
        assert_eq!(idx, 0b111);
    }

    #[test]
    fn multi_selector_clamps_lane_count() {
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing());
        let c = caps(AlgorithmType::CryptoNight, true, true);
        assert_eq!(func_multi_selector(&engine, 1, c).unwrap().lanes(), 2);
        assert_eq!(func_multi_selector(&engine, 5, c).unwrap().lanes(), 5);
        assert_eq!(func_multi_selector(&engine, 500, c).unwrap().lanes(), MAX_LANES);
        assert_eq!(select_hash_fn(&engine, 1, c).unwrap().lanes(), 1);
    }

    #[test]
    fn unsupported_variant_is_an_algorithm_error() {
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing().without(AlgorithmType::CryptoNightV7));
        let err = select_hash_fn(&engine, 2, caps(AlgorithmType::CryptoNightV7, true, true));
        assert!(matches!(err, Err(MinerError::AlgorithmError(_))));
    }

    #[test]
    fn batched_lanes_match_scalar_digests() {
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing());
        let c = caps(AlgorithmType::CryptoNight, true, false);
        let input = b"The quick brown fox jumps over the lazy dog";
        let mut pads = alloc_lanes(SlowMemoryPolicy::AlwaysUse, 4096, 5).unwrap();

        let mut single = [[0u8; 32]; 1];
        func_selector(&engine, c)
            .unwrap()
            .compute(input, input.len(), &mut single, &mut pads)
            .unwrap();

        for n in 2..=5 {
            let inputs = input.repeat(n);
            let mut out = vec![[0u8; 32]; n];
            func_multi_selector(&engine, n, c)
                .unwrap()
                .compute(&inputs, input.len(), &mut out, &mut pads)
                .unwrap();
            assert!(out.iter().all(|d| *d == single[0]), "{}-way diverged", n);
        }
    }

    #[test]
    fn short_or_undersized_inputs_are_rejected() {
        let engine: Arc<dyn HashEngine> = Arc::new(MockEngine::mixing());
        let mut pads = alloc_lanes(SlowMemoryPolicy::AlwaysUse, 4096, 2).unwrap();
        let mut out = [[0u8; 32]; 2];

        let v7 = select_hash_fn(&engine, 1, caps(AlgorithmType::CryptoNightV7, true, true)).unwrap();
        let short = [0u8; 42];
        assert!(matches!(
            v7.compute(&short, short.len(), &mut out, &mut pads),
            Err(MinerError::InputError(_))
        ));

        let two_way = select_hash_fn(&engine, 2, caps(AlgorithmType::CryptoNight, true, true)).unwrap();
        let one_input = [0u8; 43];
        assert!(two_way.compute(&one_input, 43, &mut out, &mut pads).is_err());
        assert!(two_way.compute(&[0u8; 86], 43, &mut out, &mut pads[..1]).is_err());
    }

    #[test]
    fn aes_override_cannot_invent_hardware() {
        assert!(!resolve_hardware_aes(false, Some(true)));
        assert!(!resolve_hardware_aes(true, Some(false)));
        assert!(resolve_hardware_aes(true, None));
        assert!(!resolve_hardware_aes(false, None));
    }
}
