//! Thread-affinity pinning
//!
//! Per-core performance counters are only addressable from the core that
//! owns them, so every register access is bracketed by an affinity pin:
//! while an [`AffinityGuard`] for CPU `n` is alive, the calling thread is
//! the only logical actor touching CPU `n`'s registers. This is mutual
//! exclusion by construction; no lock is involved.

use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::error::{PmcError, Result};

/// Pins the calling thread to one CPU for the guard's lifetime and
/// restores the previous affinity mask on drop.
pub struct AffinityGuard {
    old_affinity: CpuSet,
}

impl AffinityGuard {
    pub fn new(cpu: u32) -> Result<Self> {
        let old_affinity = sched_getaffinity(Pid::from_raw(0))
            .map_err(|e| PmcError::Affinity(format!("Failed to get affinity: {e}")))?;

        let mut new_affinity = CpuSet::new();
        new_affinity.set(cpu as usize).map_err(|e| {
            PmcError::Affinity(format!("Failed to set CPU {cpu} in set: {e}"))
        })?;

        sched_setaffinity(Pid::from_raw(0), &new_affinity).map_err(|e| {
            PmcError::Affinity(format!("Failed to set affinity to CPU {cpu}: {e}"))
        })?;

        Ok(Self { old_affinity })
    }
}

impl Drop for AffinityGuard {
    fn drop(&mut self) {
        let _ = sched_setaffinity(Pid::from_raw(0), &self.old_affinity);
    }
}

/// Run `body` pinned to `cpu`.
///
/// Precondition: the caller is not holding another affinity guard.
/// Postcondition: the previous affinity mask is restored, whether `body`
/// returns or panics.
pub fn with_affinity<T>(cpu: u32, body: impl FnOnce() -> T) -> Result<T> {
    let _guard = AffinityGuard::new(cpu)?;
    Ok(body())
}
