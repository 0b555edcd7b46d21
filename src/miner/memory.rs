// src/miner/memory.rs
//! Per-lane scratchpad allocation
//!
//! Every hashing lane owns one scratchpad for its whole life. Pads are
//! preferably backed by huge pages and locked into RAM ("fast memory");
//! the [`SlowMemoryPolicy`] decides what happens when that is impossible.

#![allow(unsafe_code)]

use crate::types::SlowMemoryPolicy;
use crate::utils::error::MinerError;
use std::alloc::{self, Layout};
use std::io;
use std::ptr::NonNull;

/// Alignment of slow-memory pads
const PAD_ALIGN: usize = 4096;

enum Backing {
    Heap(Layout),
    #[cfg(target_os = "linux")]
    HugePages,
}

/// Scratch memory for one hashing lane
pub struct ScratchPad {
    ptr: NonNull<u8>,
    len: usize,
    backing: Backing,
    locked: bool,
}

// The pad exclusively owns its mapping; it only moves between threads
// before hashing starts.
unsafe impl Send for ScratchPad {}

impl ScratchPad {
    /// Size of the pad in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the pad has zero size
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the pad is backed by huge pages
    pub fn is_huge_pages(&self) -> bool {
        !matches!(self.backing, Backing::Heap(_))
    }

    /// Whether the pad is locked into physical memory
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The pad's memory
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and uniquely borrowed through self
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ScratchPad {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the region created in `allocate`
        unsafe {
            if self.locked {
                libc::munlock(self.ptr.as_ptr().cast(), self.len);
            }
            match self.backing {
                Backing::Heap(layout) => alloc::dealloc(self.ptr.as_ptr(), layout),
                #[cfg(target_os = "linux")]
                Backing::HugePages => {
                    libc::munmap(self.ptr.as_ptr().cast(), self.len);
                }
            }
        }
    }
}

/// A successful allocation plus any non-fatal complaint
pub struct Allocation {
    /// The allocated pad
    pub pad: ScratchPad,
    /// Set when the pad is usable but not everything requested was granted
    pub warning: Option<String>,
}

/// Allocates one pad
///
/// # Arguments
/// * `size` - Pad size in bytes
/// * `huge_pages` - Back the pad with huge pages instead of the heap
/// * `lock` - Lock the pad into RAM; failure only produces a warning
pub fn allocate(size: usize, huge_pages: bool, lock: bool) -> Result<Allocation, MinerError> {
    if size == 0 {
        return Err(MinerError::MemoryAllocation("zero-sized scratchpad".into()));
    }

    let (ptr, backing) = if huge_pages {
        map_huge_pages(size)?
    } else {
        let layout = Layout::from_size_align(size, PAD_ALIGN)
            .map_err(|e| MinerError::MemoryAllocation(e.to_string()))?;
        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            MinerError::MemoryAllocation(format!("out of memory allocating {} bytes", size))
        })?;
        (ptr, Backing::Heap(layout))
    };

    let mut pad = ScratchPad {
        ptr,
        len: size,
        backing,
        locked: false,
    };

    let mut warning = None;
    if lock {
        // SAFETY: the region is owned by `pad`
        if unsafe { libc::mlock(pad.ptr.as_ptr().cast(), size) } == 0 {
            pad.locked = true;
        } else {
            warning = Some(format!("mlock failed: {}", io::Error::last_os_error()));
        }
    }

    Ok(Allocation { pad, warning })
}

#[cfg(target_os = "linux")]
fn map_huge_pages(size: usize) -> Result<(NonNull<u8>, Backing), MinerError> {
    // SAFETY: anonymous private mapping, no aliasing
    let raw = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB | libc::MAP_POPULATE,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return Err(MinerError::MemoryAllocation(format!(
            "mmap of {} bytes with huge pages failed: {}",
            size,
            io::Error::last_os_error()
        )));
    }
    let ptr = NonNull::new(raw.cast::<u8>())
        .ok_or_else(|| MinerError::MemoryAllocation("mmap returned null".into()))?;
    Ok((ptr, Backing::HugePages))
}

#[cfg(not(target_os = "linux"))]
fn map_huge_pages(_size: usize) -> Result<(NonNull<u8>, Backing), MinerError> {
    Err(MinerError::MemoryAllocation(
        "huge pages are not supported on this platform".into(),
    ))
}

/// Allocates one pad according to the slow-memory policy
///
/// # Errors
/// `never_use` and `no_mlck` fail when huge pages are unavailable;
/// `print_warning` only fails if the slow-memory retry fails too.
pub fn alloc_scratch(policy: SlowMemoryPolicy, size: usize) -> Result<ScratchPad, MinerError> {
    if policy.is_fatal() {
        let lock = policy != SlowMemoryPolicy::NoMlck;
        return strict(allocate(size, true, lock));
    }
    match policy {
        SlowMemoryPolicy::PrintWarning => match allocate(size, true, true) {
            Ok(a) => {
                if let Some(w) = a.warning {
                    log::warn!("MEMORY ALLOC FAILED: {}", w);
                }
                Ok(a.pad)
            }
            Err(e) => {
                log::warn!("MEMORY ALLOC FAILED: {}, falling back to slow memory", e);
                allocate(size, false, false).map(|a| a.pad)
            }
        },
        _ => allocate(size, false, false).map(|a| a.pad),
    }
}

fn strict(result: Result<Allocation, MinerError>) -> Result<ScratchPad, MinerError> {
    match result {
        Ok(a) => {
            if let Some(w) = a.warning {
                log::warn!("{}", w);
            }
            Ok(a.pad)
        }
        Err(e) => {
            log::error!("MEMORY ALLOC FAILED: {}", e);
            Err(e)
        }
    }
}

/// Allocates `lanes` pads; already allocated pads are freed on failure
pub fn alloc_lanes(
    policy: SlowMemoryPolicy,
    size: usize,
    lanes: usize,
) -> Result<Vec<ScratchPad>, MinerError> {
    (0..lanes).map(|_| alloc_scratch(policy, size)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 2 * 1024 * 1024;

    #[test]
    fn slow_memory_pad_is_zeroed_and_writable() {
        let mut pad = alloc_scratch(SlowMemoryPolicy::AlwaysUse, SIZE).unwrap();
        assert_eq!(pad.len(), SIZE);
        assert!(!pad.is_huge_pages());
        assert!(!pad.is_locked());
        let mem = pad.as_mut_slice();
        assert!(mem[..4096].iter().all(|b| *b == 0));
        mem[SIZE - 1] = 0x5A;
        assert_eq!(pad.as_mut_slice()[SIZE - 1], 0x5A);
        assert_eq!(pad.as_mut_slice().as_ptr() as usize % PAD_ALIGN, 0);
    }

    #[test]
    fn print_warning_always_yields_a_pad() {
        let pad = alloc_scratch(SlowMemoryPolicy::PrintWarning, SIZE).unwrap();
        assert_eq!(pad.len(), SIZE);
    }

    #[test]
    fn strict_policies_never_fall_back_to_slow_memory() {
        for policy in [SlowMemoryPolicy::NeverUse, SlowMemoryPolicy::NoMlck] {
            match alloc_scratch(policy, SIZE) {
                Ok(pad) => assert!(pad.is_huge_pages()),
                Err(e) => assert!(matches!(e, MinerError::MemoryAllocation(_))),
            }
        }
    }

    #[test]
    fn zero_sized_pad_is_rejected() {
        assert!(allocate(0, false, false).is_err());
    }

    #[test]
    fn lanes_are_allocated_independently() {
        let mut pads = alloc_lanes(SlowMemoryPolicy::AlwaysUse, 4096, 3).unwrap();
        assert_eq!(pads.len(), 3);
        pads[0].as_mut_slice()[0] = 1;
        assert_eq!(pads[1].as_mut_slice()[0], 0);
    }
}
