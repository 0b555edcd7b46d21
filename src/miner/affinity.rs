// src/miner/affinity.rs
//! Pinning the calling thread to one CPU

#![allow(unsafe_code)]

use crate::utils::error::MinerError;

/// Binds the calling thread to `cpu_id`
///
/// Must be called from the thread being pinned.
#[cfg(target_os = "linux")]
pub fn bind_current_thread(cpu_id: usize) -> Result<(), MinerError> {
    use std::mem;

    if cpu_id >= libc::CPU_SETSIZE as usize {
        return Err(MinerError::AffinityError(format!(
            "CPU {} exceeds the affinity mask size",
            cpu_id
        )));
    }

    // SAFETY: cpu_set_t is plain data; cpu_id is bounds-checked above
    let result = unsafe {
        let mut cpuset: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut cpuset);
        libc::CPU_SET(cpu_id, &mut cpuset);
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &cpuset)
    };

    if result == 0 {
        Ok(())
    } else {
        Err(MinerError::AffinityError(format!(
            "sched_setaffinity failed for CPU {}: {}",
            cpu_id,
            std::io::Error::last_os_error()
        )))
    }
}

/// Binds the calling thread to `cpu_id`
///
/// Not available on this platform; the scheduler places threads freely.
#[cfg(not(target_os = "linux"))]
pub fn bind_current_thread(cpu_id: usize) -> Result<(), MinerError> {
    Err(MinerError::AffinityError(format!(
        "thread affinity is not supported on this platform (CPU {})",
        cpu_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_cpu_is_rejected() {
        let err = std::thread::spawn(|| bind_current_thread(1 << 20))
            .join()
            .unwrap();
        assert!(matches!(err, Err(MinerError::AffinityError(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn binds_to_a_cpu_we_are_allowed_on() {
        // CPU 0 may be excluded by a cpuset; only assert when it is usable
        let result = std::thread::spawn(|| bind_current_thread(0)).join().unwrap();
        if let Err(e) = result {
            assert!(e.to_string().contains("sched_setaffinity"));
        }
    }
}
