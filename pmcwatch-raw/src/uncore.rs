//! Uncore monitoring-box register definitions
//!
//! Uncore performance monitoring lives in "boxes": per-unit register blocks
//! for the cache agents (CBo on Sandy Bridge server parts, CHA on Skylake
//! server parts) and other shared functional units. Each box carries a box
//! control register (freeze/reset), a bank of counter control registers,
//! and the counters themselves, all at a fixed stride from the previous
//! box.
//!
//! Client parts expose a reduced uncore: a single system-agent arbiter
//! block with two counters and a global enable instead of per-box freeze
//! control.
//!
//! ## References
//!
//! - Intel® Xeon® Processor E5 Uncore Performance Monitoring Guide
//! - Intel® Xeon® Processor Scalable Family Uncore Performance Monitoring
//!   Reference Manual

use crate::register::RegisterLayout;

/// Uncore Box Control Register layout
///
/// Controls freeze and reset for every counter in one box. A box must be
/// freeze-enabled and frozen before its counters are reset, and unfrozen
/// afterwards, or it stops counting permanently.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncoreBoxControl {
    /// Reset all counter control registers (bit 0)
    pub reset_control: bool,
    /// Reset all counters to 0 (bit 1)
    pub reset_counters: bool,
    /// Freeze all counters in this box (bit 8)
    pub freeze: bool,
    /// Enable the freeze signal (bit 16)
    pub freeze_enable: bool,
}

impl UncoreBoxControl {
    /// Step 1 of the reprogram sequence: arm the freeze signal
    pub const fn freeze_enabled() -> Self {
        Self {
            reset_control: false,
            reset_counters: false,
            freeze: false,
            freeze_enable: true,
        }
    }

    /// Step 2: freeze counting
    pub const fn frozen() -> Self {
        Self {
            reset_control: false,
            reset_counters: false,
            freeze: true,
            freeze_enable: true,
        }
    }

    /// Step 4 (after event selects are written): clear counters while
    /// still frozen
    pub const fn frozen_and_cleared() -> Self {
        Self {
            reset_control: false,
            reset_counters: true,
            freeze: true,
            freeze_enable: true,
        }
    }

    /// Step 5: resume counting
    pub const fn unfrozen() -> Self {
        Self {
            reset_control: false,
            reset_counters: false,
            freeze: false,
            freeze_enable: true,
        }
    }
}

impl RegisterLayout for UncoreBoxControl {
    fn to_msr_value(&self) -> u64 {
        (if self.reset_control { 1 << 0 } else { 0 })
            | (if self.reset_counters { 1 << 1 } else { 0 })
            | (if self.freeze { 1 << 8 } else { 0 })
            | (if self.freeze_enable { 1 << 16 } else { 0 })
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            reset_control: (value & (1 << 0)) != 0,
            reset_counters: (value & (1 << 1)) != 0,
            freeze: (value & (1 << 8)) != 0,
            freeze_enable: (value & (1 << 16)) != 0,
        }
    }
}

/// Uncore Counter Control Register layout
///
/// Controls one programmable counter in an uncore box. Unlike the core
/// perfevtsel there are no user/kernel mode bits (the uncore has no
/// privilege level) and no any-thread bit.
///
/// ## Register Format
///
/// | Bits   | Field        | Description                     |
/// |--------|--------------|---------------------------------|
/// | 0-7    | event_select | Event code to count             |
/// | 8-15   | umask        | Event sub-select                |
/// | 18     | edge_detect  | Count rising edges vs level     |
/// | 22     | enable       | Enable counter                  |
/// | 23     | invert       | Invert threshold comparison     |
/// | 24-31  | threshold    | Threshold for filtering         |
#[derive(Debug, Clone, Copy, Default)]
pub struct UncoreCounterControl {
    /// Event select code (bits 0-7)
    pub event_select: u8,

    /// Unit mask / event sub-select (bits 8-15)
    pub umask: u8,

    /// Edge detection mode (bit 18)
    pub edge_detect: bool,

    /// Enable counter (bit 22)
    pub enable: bool,

    /// Invert threshold comparison (bit 23)
    pub invert: bool,

    /// Threshold for occupancy filtering (bits 24-31)
    pub threshold: u8,
}

impl RegisterLayout for UncoreCounterControl {
    fn to_msr_value(&self) -> u64 {
        (self.event_select as u64)
            | ((self.umask as u64) << 8)
            | (if self.edge_detect { 1 << 18 } else { 0 })
            | (if self.enable { 1 << 22 } else { 0 })
            | (if self.invert { 1 << 23 } else { 0 })
            | ((self.threshold as u64) << 24)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            event_select: (value & 0xFF) as u8,
            umask: ((value >> 8) & 0xFF) as u8,
            edge_detect: (value & (1 << 18)) != 0,
            enable: (value & (1 << 22)) != 0,
            invert: (value & (1 << 23)) != 0,
            threshold: ((value >> 24) & 0xFF) as u8,
        }
    }
}

/// Address map for a family of uncore boxes
///
/// Box `n` lives at `base + n * stride`; within a box the counter control
/// and counter value banks sit at fixed offsets from the box control.
#[derive(Debug, Clone, Copy)]
pub struct UncoreBoxMap {
    /// Box control MSR of box 0
    pub box_ctl_base: u64,
    /// Counter control 0 MSR of box 0
    pub counter_ctl_base: u64,
    /// Counter value 0 MSR of box 0
    pub counter_base: u64,
    /// Stride between consecutive boxes
    pub box_stride: u64,
    /// Programmable counters per box
    pub counters_per_box: usize,
    /// Counter width in bits
    pub counter_width: u32,
    /// Architectural maximum box count; hardware may expose fewer
    pub max_boxes: usize,
}

impl UncoreBoxMap {
    /// Box control MSR address for box `n`
    pub const fn box_ctl(&self, n: usize) -> u64 {
        self.box_ctl_base + n as u64 * self.box_stride
    }

    /// Counter control MSR address for counter `c` of box `n`
    pub const fn counter_ctl(&self, n: usize, c: usize) -> u64 {
        self.counter_ctl_base + n as u64 * self.box_stride + c as u64
    }

    /// Counter value MSR address for counter `c` of box `n`
    pub const fn counter(&self, n: usize, c: usize) -> u64 {
        self.counter_base + n as u64 * self.box_stride + c as u64
    }
}

/// CHA (Caching/Home Agent) boxes on Skylake server parts
pub const SKYLAKE_CHA: UncoreBoxMap = UncoreBoxMap {
    box_ctl_base: 0xE00,
    counter_ctl_base: 0xE01,
    counter_base: 0xE08,
    box_stride: 0x10,
    counters_per_box: 4,
    counter_width: 48,
    max_boxes: 28,
};

/// CBo (Cache Box) agents on Sandy Bridge server parts
pub const SANDY_BRIDGE_CBO: UncoreBoxMap = UncoreBoxMap {
    box_ctl_base: 0xD04,
    counter_ctl_base: 0xD10,
    counter_base: 0xD16,
    box_stride: 0x20,
    counters_per_box: 4,
    counter_width: 44,
    max_boxes: 8,
};

/// Client uncore registers (single system-agent arbiter block)
pub mod arb {
    /// Global enable for the client uncore PMU; bit 29 enables counting
    pub const MSR_UNC_PERF_GLOBAL_CTRL: u64 = 0x391;

    /// Enable bit within [`MSR_UNC_PERF_GLOBAL_CTRL`]
    pub const GLOBAL_ENABLE_BIT: u64 = 1 << 29;

    /// Arbiter counter value MSRs
    pub const MSR_UNC_ARB_PERFCTR0: u64 = 0x3B0;

    /// Arbiter counter control MSRs
    pub const MSR_UNC_ARB_PERFEVTSEL0: u64 = 0x3B2;

    /// Counters in the arbiter block
    pub const ARB_COUNTERS: usize = 2;

    /// Width of the arbiter counters
    pub const ARB_COUNTER_WIDTH: u32 = 44;

    /// Counter control MSR for arbiter counter `c`
    pub const fn counter_ctl(c: usize) -> u64 {
        MSR_UNC_ARB_PERFEVTSEL0 + c as u64
    }

    /// Counter value MSR for arbiter counter `c`
    pub const fn counter(c: usize) -> u64 {
        MSR_UNC_ARB_PERFCTR0 + c as u64
    }

    /// Tracker occupancy, all requests
    pub const EVENT_TRK_OCCUPANCY: u8 = 0x80;

    /// Tracker inserts, all requests
    pub const EVENT_TRK_REQUESTS: u8 = 0x81;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_control_round_trip_each_field() {
        let probes = [
            UncoreBoxControl {
                reset_control: true,
                ..Default::default()
            },
            UncoreBoxControl {
                reset_counters: true,
                ..Default::default()
            },
            UncoreBoxControl {
                freeze: true,
                ..Default::default()
            },
            UncoreBoxControl {
                freeze_enable: true,
                ..Default::default()
            },
        ];

        for ctl in probes {
            let value = ctl.to_msr_value();
            assert_eq!(value.count_ones(), 1);
            let decoded = UncoreBoxControl::from_msr_value(value);
            assert_eq!(decoded.reset_control, ctl.reset_control);
            assert_eq!(decoded.reset_counters, ctl.reset_counters);
            assert_eq!(decoded.freeze, ctl.freeze);
            assert_eq!(decoded.freeze_enable, ctl.freeze_enable);
        }
    }

    #[test]
    fn test_box_control_sequence_values_are_distinct() {
        let seq = [
            UncoreBoxControl::freeze_enabled().to_msr_value(),
            UncoreBoxControl::frozen().to_msr_value(),
            UncoreBoxControl::frozen_and_cleared().to_msr_value(),
            UncoreBoxControl::unfrozen().to_msr_value(),
        ];
        assert_eq!(seq[0], seq[3]);
        assert_ne!(seq[0], seq[1]);
        assert_ne!(seq[1], seq[2]);
    }

    #[test]
    fn test_uncore_counter_control_round_trip() {
        let ctl = UncoreCounterControl {
            event_select: 0x34,
            umask: 0x11,
            enable: true,
            threshold: 10,
            ..Default::default()
        };

        let value = ctl.to_msr_value();
        let decoded = UncoreCounterControl::from_msr_value(value);

        assert_eq!(decoded.event_select, ctl.event_select);
        assert_eq!(decoded.umask, ctl.umask);
        assert_eq!(decoded.enable, ctl.enable);
        assert_eq!(decoded.threshold, ctl.threshold);
        assert!(!decoded.edge_detect);
        assert!(!decoded.invert);
    }

    #[test]
    fn test_skylake_cha_addresses() {
        assert_eq!(SKYLAKE_CHA.box_ctl(0), 0xE00);
        assert_eq!(SKYLAKE_CHA.box_ctl(1), 0xE10);
        assert_eq!(SKYLAKE_CHA.counter_ctl(0, 0), 0xE01);
        assert_eq!(SKYLAKE_CHA.counter_ctl(0, 3), 0xE04);
        assert_eq!(SKYLAKE_CHA.counter(2, 1), 0xE29);
    }

    #[test]
    fn test_sandy_bridge_cbo_addresses() {
        assert_eq!(SANDY_BRIDGE_CBO.box_ctl(0), 0xD04);
        assert_eq!(SANDY_BRIDGE_CBO.counter_ctl(1, 0), 0xD30);
        assert_eq!(SANDY_BRIDGE_CBO.counter(0, 3), 0xD19);
    }

    #[test]
    fn test_arb_addresses() {
        assert_eq!(arb::counter_ctl(0), 0x3B2);
        assert_eq!(arb::counter_ctl(1), 0x3B3);
        assert_eq!(arb::counter(1), 0x3B1);
    }
}
