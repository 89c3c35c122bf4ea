//! PCU (Power Control Unit) register definitions
//!
//! The PCU is a single uncore box monitoring the package power-management
//! firmware: frequency-limit residency, P-state transitions, and core
//! power-state occupancy. Its counter control register differs from the
//! generic uncore layout: there are no unit masks, bits 14-15 select an
//! occupancy sub-counter, and bit 21 is an extra event-select bit rather
//! than pin control.
//!
//! ## References
//!
//! - Intel® Xeon® Processor E5 Uncore Performance Monitoring Guide,
//!   PCU chapter

use crate::register::RegisterLayout;
use crate::uncore::UncoreBoxMap;

/// PCU box address map on Sandy Bridge server parts (one box)
pub const SANDY_BRIDGE_PCU: UncoreBoxMap = UncoreBoxMap {
    box_ctl_base: 0xC24,
    counter_ctl_base: 0xC30,
    counter_base: 0xC36,
    box_stride: 0,
    counters_per_box: 4,
    counter_width: 48,
    max_boxes: 1,
};

/// PCU event codes
pub mod events {
    /// P-state transition cycles
    pub const FREQ_TRANS_CYCLES: u8 = 0x00;

    /// Cycles frequency-limited by thermal events
    pub const FREQ_MAX_LIMIT_THERMAL_CYCLES: u8 = 0x04;

    /// Cycles frequency-limited by the power budget
    pub const FREQ_MAX_POWER_CYCLES: u8 = 0x05;

    /// Cycles frequency-limited by the OS request
    pub const FREQ_MAX_OS_CYCLES: u8 = 0x06;

    /// Core power-state occupancy; pick the state via `occupancy_select`
    pub const POWER_STATE_OCCUPANCY: u8 = 0x80;
}

/// Occupancy sub-counter selectors for [`events::POWER_STATE_OCCUPANCY`]
pub mod occupancy {
    /// Cores in C0
    pub const C0: u8 = 0x01;
    /// Cores in C3
    pub const C3: u8 = 0x02;
    /// Cores in C6 or deeper
    pub const C6: u8 = 0x03;
}

/// PCU Counter Control Register layout
///
/// ## Register Format
///
/// | Bits   | Field             | Description                        |
/// |--------|-------------------|------------------------------------|
/// | 0-7    | event_select      | Event code to count                |
/// | 14-15  | occupancy_select  | Occupancy sub-counter (2 bits)     |
/// | 18     | edge_detect       | Count rising edges vs level        |
/// | 21     | extra_select      | Extra event-select bit             |
/// | 22     | enable            | Enable counter                     |
/// | 23     | invert            | Invert threshold comparison        |
/// | 24-28  | threshold         | Threshold for filtering (5 bits)   |
/// | 30     | occupancy_invert  | Invert occupancy edge              |
/// | 31     | occupancy_edge    | Occupancy edge detect              |
#[derive(Debug, Clone, Copy, Default)]
pub struct PcuCounterControl {
    /// Event select code (bits 0-7)
    pub event_select: u8,

    /// Occupancy sub-counter select (bits 14-15, 2 bits)
    pub occupancy_select: u8,

    /// Edge detection mode (bit 18)
    pub edge_detect: bool,

    /// Extra event-select bit (bit 21); this position carries pin control
    /// on the core PMU
    pub extra_select: bool,

    /// Enable counter (bit 22)
    pub enable: bool,

    /// Invert threshold comparison (bit 23)
    pub invert: bool,

    /// Threshold value for occupancy filtering (bits 24-28, 5 bits)
    pub threshold: u8,

    /// Invert occupancy edge (bit 30)
    pub occupancy_invert: bool,

    /// Occupancy edge detect (bit 31)
    pub occupancy_edge: bool,
}

impl RegisterLayout for PcuCounterControl {
    fn to_msr_value(&self) -> u64 {
        (self.event_select as u64)
            | ((self.occupancy_select as u64 & 0x03) << 14)
            | (if self.edge_detect { 1 << 18 } else { 0 })
            | (if self.extra_select { 1 << 21 } else { 0 })
            | (if self.enable { 1 << 22 } else { 0 })
            | (if self.invert { 1 << 23 } else { 0 })
            | ((self.threshold as u64 & 0x1F) << 24)
            | (if self.occupancy_invert { 1 << 30 } else { 0 })
            | (if self.occupancy_edge { 1 << 31 } else { 0 })
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            event_select: (value & 0xFF) as u8,
            occupancy_select: ((value >> 14) & 0x03) as u8,
            edge_detect: (value & (1 << 18)) != 0,
            extra_select: (value & (1 << 21)) != 0,
            enable: (value & (1 << 22)) != 0,
            invert: (value & (1 << 23)) != 0,
            threshold: ((value >> 24) & 0x1F) as u8,
            occupancy_invert: (value & (1 << 30)) != 0,
            occupancy_edge: (value & (1 << 31)) != 0,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.occupancy_select > 3 {
            return Err("Occupancy select must be 0-3 (2 bits)");
        }
        if self.threshold > 31 {
            return Err("Threshold must be <= 31 (5 bits)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcu_control_round_trip_each_field() {
        let probes = [
            PcuCounterControl {
                event_select: 0x80,
                ..Default::default()
            },
            PcuCounterControl {
                occupancy_select: 0x03,
                ..Default::default()
            },
            PcuCounterControl {
                edge_detect: true,
                ..Default::default()
            },
            PcuCounterControl {
                extra_select: true,
                ..Default::default()
            },
            PcuCounterControl {
                enable: true,
                ..Default::default()
            },
            PcuCounterControl {
                invert: true,
                ..Default::default()
            },
            PcuCounterControl {
                threshold: 0x1F,
                ..Default::default()
            },
            PcuCounterControl {
                occupancy_invert: true,
                ..Default::default()
            },
            PcuCounterControl {
                occupancy_edge: true,
                ..Default::default()
            },
        ];

        for ctl in probes {
            let decoded = PcuCounterControl::from_msr_value(ctl.to_msr_value());
            assert_eq!(decoded.event_select, ctl.event_select);
            assert_eq!(decoded.occupancy_select, ctl.occupancy_select);
            assert_eq!(decoded.edge_detect, ctl.edge_detect);
            assert_eq!(decoded.extra_select, ctl.extra_select);
            assert_eq!(decoded.enable, ctl.enable);
            assert_eq!(decoded.invert, ctl.invert);
            assert_eq!(decoded.threshold, ctl.threshold);
            assert_eq!(decoded.occupancy_invert, ctl.occupancy_invert);
            assert_eq!(decoded.occupancy_edge, ctl.occupancy_edge);
        }
    }

    #[test]
    fn test_extra_select_sits_at_bit_21() {
        let ctl = PcuCounterControl {
            extra_select: true,
            ..Default::default()
        };
        assert_eq!(ctl.to_msr_value(), 1 << 21);
    }

    #[test]
    fn test_pcu_validation() {
        let mut ctl = PcuCounterControl::default();
        assert!(ctl.validate().is_ok());

        ctl.threshold = 32;
        assert!(ctl.validate().is_err());
    }

    #[test]
    fn test_pcu_box_addresses() {
        assert_eq!(SANDY_BRIDGE_PCU.box_ctl(0), 0xC24);
        assert_eq!(SANDY_BRIDGE_PCU.counter_ctl(0, 2), 0xC32);
        assert_eq!(SANDY_BRIDGE_PCU.counter(0, 3), 0xC39);
    }
}
