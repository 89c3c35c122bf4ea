//! Counter reading, overflow-aware deltas, and time normalization
//!
//! Two reading models coexist:
//!
//! - **read-and-clear**: read the counter, write zero back. Used for the
//!   core fixed and programmable counters, which the session drains every
//!   tick; the raw value *is* the delta and no overflow arithmetic is
//!   needed.
//! - **differenced**: the counter keeps running (uncore boxes, RAPL energy
//!   meters) and each sample is differenced against the previous one with
//!   width-aware wraparound handling.
//!
//! Raw deltas are scaled to per-second rates by a normalization factor
//! derived from the wall-clock interval since the previous sample. The
//! first sample of a session has no previous timestamp and uses a factor
//! of exactly 1; that first tick therefore reads as "per interval" rather
//! than "per second" unless the interval happens to be one second. This
//! matches the long-standing behavior of this tool family and is kept for
//! compatibility.

use std::time::Instant;

use crate::engine::RegisterAccess;
use crate::error::Result;

/// One readable counter: a register address on a CPU, with a bit width
#[derive(Debug, Clone, Copy)]
pub struct CounterSlot {
    pub cpu: u32,
    pub address: u64,
    pub width: u32,
}

/// Per-slot bookkeeping between samples
#[derive(Debug, Clone, Default)]
pub struct NormalizationState {
    pub last_raw: u64,
    pub last_sample: Option<Instant>,
}

impl NormalizationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalization factor for a sample taken at `now`.
    ///
    /// 1000 / elapsed-milliseconds once a previous sample exists; exactly
    /// 1.0 before that. Never divides by zero: a degenerate elapsed time
    /// also yields 1.0.
    pub fn factor_at(&self, now: Instant) -> f64 {
        match self.last_sample {
            None => 1.0,
            Some(prev) => {
                let elapsed_ms = now.duration_since(prev).as_secs_f64() * 1000.0;
                if elapsed_ms <= 0.0 {
                    1.0
                } else {
                    1000.0 / elapsed_ms
                }
            }
        }
    }

    /// Record the raw value and timestamp of the sample just taken.
    ///
    /// Must run on every sample, including the degenerate first one,
    /// or the next delta is computed against a stale raw value.
    pub fn advance(&mut self, raw: u64, now: Instant) {
        self.last_raw = raw;
        self.last_sample = Some(now);
    }
}

/// Value mask for a counter of the given bit width
pub fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Difference two raw samples of a free-running counter.
///
/// Both values are masked to the counter width before comparison. A
/// current value at or below the previous one is taken as a single
/// wraparound; multiple wraps within one polling interval are not
/// detectable and not handled.
pub fn compute_delta(width: u32, current: u64, previous: u64) -> u64 {
    let mask = width_mask(width);
    let current = current & mask;
    let previous = previous & mask;

    if current > previous {
        current - previous
    } else {
        // Counted up to the width limit, wrapped to zero, then on to the
        // current value
        current.wrapping_add(mask - previous).wrapping_add(1)
    }
}

/// Reads counters through a [`RegisterAccess`] capability
pub struct NormalizingReader<'a> {
    access: &'a dyn RegisterAccess,
}

impl<'a> NormalizingReader<'a> {
    pub fn new(access: &'a dyn RegisterAccess) -> Self {
        Self { access }
    }

    /// Read a counter and write zero back.
    ///
    /// Safe as a two-step sequence because the affinity discipline
    /// guarantees no concurrent writer for the slot.
    pub fn read_and_clear(&self, slot: CounterSlot) -> Result<u64> {
        let value = self.access.read(slot.cpu, slot.address)?;
        self.access.write(slot.cpu, slot.address, 0)?;
        Ok(value & width_mask(slot.width))
    }

    /// Sample a free-running counter and return the delta since the
    /// previous sample, updating `state`.
    ///
    /// On the first sample after (re)programming, the counter was just
    /// reset, so the raw value itself is the delta.
    pub fn read_delta(
        &self,
        slot: CounterSlot,
        state: &mut NormalizationState,
        now: Instant,
    ) -> Result<u64> {
        let raw = self.access.read(slot.cpu, slot.address)? & width_mask(slot.width);
        let delta = if state.last_sample.is_none() {
            raw
        } else {
            compute_delta(slot.width, raw, state.last_raw)
        };
        state.advance(raw, now);
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockAccess, MockOp};
    use std::time::Duration;

    #[test]
    fn test_delta_32bit_wraparound() {
        // 0xFFFF_FFF0 -> 0x5 across a wrap is 21 events
        assert_eq!(compute_delta(32, 0x0000_0005, 0xFFFF_FFF0), 0x15);
    }

    #[test]
    fn test_delta_64bit_no_wrap() {
        assert_eq!(compute_delta(64, 250, 100), 150);
    }

    #[test]
    fn test_delta_48bit_masks_before_compare() {
        // Garbage in the top 16 bits must not defeat the wrap detection
        let previous = 0xFFFF_FFFF_FFFF_FFF0u64;
        let current = 0xAAAA_0000_0000_0005u64;
        assert_eq!(compute_delta(48, current, previous), 0x15);
    }

    #[test]
    fn test_delta_44bit_plain() {
        assert_eq!(compute_delta(44, 1_000_000, 400_000), 600_000);
    }

    #[test]
    fn test_first_sample_factor_is_one() {
        let state = NormalizationState::new();
        let factor = state.factor_at(Instant::now());
        assert_eq!(factor, 1.0);
    }

    #[test]
    fn test_factor_scales_by_elapsed_time() {
        let t0 = Instant::now();
        let mut state = NormalizationState::new();
        state.advance(0, t0);

        // 2 seconds elapsed -> factor 0.5
        let factor = state.factor_at(t0 + Duration::from_secs(2));
        assert!((factor - 0.5).abs() < 1e-9);

        // 250 ms elapsed -> factor 4
        let factor = state.factor_at(t0 + Duration::from_millis(250));
        assert!((factor - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_elapsed_time_does_not_divide_by_zero() {
        let t0 = Instant::now();
        let mut state = NormalizationState::new();
        state.advance(0, t0);
        assert_eq!(state.factor_at(t0), 1.0);
    }

    #[test]
    fn test_read_and_clear_writes_zero() {
        let mock = MockAccess::new();
        mock.set(2, 0xC1, 1234);

        let reader = NormalizingReader::new(&mock);
        let slot = CounterSlot {
            cpu: 2,
            address: 0xC1,
            width: 48,
        };
        let value = reader.read_and_clear(slot).unwrap();

        assert_eq!(value, 1234);
        assert_eq!(mock.get(2, 0xC1), 0);
        assert_eq!(
            mock.ops(),
            vec![
                MockOp::Read { cpu: 2, addr: 0xC1 },
                MockOp::Write {
                    cpu: 2,
                    addr: 0xC1,
                    value: 0
                },
            ]
        );
    }

    #[test]
    fn test_read_delta_tracks_state() {
        let mock = MockAccess::new();
        let reader = NormalizingReader::new(&mock);
        let slot = CounterSlot {
            cpu: 0,
            address: 0x611,
            width: 32,
        };
        let mut state = NormalizationState::new();
        let t0 = Instant::now();

        // First sample: counter was just reset, raw value is the delta
        mock.set(0, 0x611, 500);
        assert_eq!(reader.read_delta(slot, &mut state, t0).unwrap(), 500);
        assert_eq!(state.last_raw, 500);

        // Second sample: plain difference
        mock.set(0, 0x611, 800);
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(reader.read_delta(slot, &mut state, t1).unwrap(), 300);
        assert_eq!(state.last_sample, Some(t1));
    }
}
