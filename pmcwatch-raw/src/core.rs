//! Core PMU register definitions
//!
//! Every Intel core since Sandy Bridge exposes the same architectural
//! skeleton: a bank of programmable counters steered by IA32_PERFEVTSELx,
//! three fixed-function counters (retired instructions, core cycles,
//! reference cycles), and a global enable register gating all of them.
//! The perfevtsel bit layout is stable across the classic cores; hybrid
//! parts (Alder Lake onward) extend it with a umask-extension field in the
//! upper half of the register.
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual,
//!   Volume 3B, Chapter 18: Performance Monitoring

use crate::register::RegisterLayout;

/// MSR addresses for the core PMU
pub mod msr {
    /// Performance Event Select base address (IA32_PERFEVTSEL0)
    pub const IA32_PERFEVTSEL0: u64 = 0x186;

    /// Programmable counter base address (IA32_PMC0)
    pub const IA32_PMC0: u64 = 0xC1;

    /// Fixed-function counter control
    pub const IA32_FIXED_CTR_CTRL: u64 = 0x38D;

    /// Fixed-function counters: instructions retired, core cycles,
    /// reference cycles
    pub const IA32_FIXED_CTR0: u64 = 0x309;
    pub const IA32_FIXED_CTR1: u64 = 0x30A;
    pub const IA32_FIXED_CTR2: u64 = 0x30B;

    /// Global counter enable
    pub const IA32_PERF_GLOBAL_CTRL: u64 = 0x38F;

    /// Global counter overflow status
    pub const IA32_PERF_GLOBAL_STATUS: u64 = 0x38E;

    /// Global counter overflow status reset
    pub const IA32_PERF_GLOBAL_OVF_CTRL: u64 = 0x390;

    /// Timestamp counter
    pub const IA32_TIME_STAMP_COUNTER: u64 = 0x10;

    /// Platform info (base frequency ratio)
    pub const MSR_PLATFORM_INFO: u64 = 0xCE;

    /// Event select MSR for programmable counter `n`
    pub const fn perfevtsel(n: usize) -> u64 {
        IA32_PERFEVTSEL0 + n as u64
    }

    /// Counter value MSR for programmable counter `n`
    pub const fn pmc(n: usize) -> u64 {
        IA32_PMC0 + n as u64
    }

    /// Counter value MSR for fixed counter `n`
    pub const fn fixed_ctr(n: usize) -> u64 {
        IA32_FIXED_CTR0 + n as u64
    }
}

/// Core Performance Event Select Register layout
///
/// ## Register Format
///
/// | Bits   | Field        | Description                    |
/// |--------|--------------|--------------------------------|
/// | 0-7    | event_select | Event select                   |
/// | 8-15   | umask        | Unit mask                      |
/// | 16     | usr          | Count in user mode             |
/// | 17     | os           | Count in kernel mode           |
/// | 18     | edge         | Edge detect                    |
/// | 19     | pin_control  | Pin control                    |
/// | 20     | interrupt    | APIC interrupt on overflow     |
/// | 21     | any_thread   | Count both SMT siblings        |
/// | 22     | enable       | Enable counter                 |
/// | 23     | invert       | Invert counter-mask comparison |
/// | 24-31  | cmask        | Counter mask                   |
#[derive(Debug, Clone, Copy, Default)]
pub struct CorePerfEvtSel {
    /// Event select code (bits 0-7)
    pub event_select: u8,

    /// Unit mask / event sub-select (bits 8-15)
    pub umask: u8,

    /// Count in user mode (bit 16)
    pub usr: bool,

    /// Count in kernel mode (bit 17)
    pub os: bool,

    /// Edge detect (bit 18)
    pub edge: bool,

    /// Pin control (bit 19)
    pub pin_control: bool,

    /// APIC interrupt on overflow (bit 20)
    pub interrupt: bool,

    /// Count events from both SMT siblings (bit 21); core PMUs only
    pub any_thread: bool,

    /// Enable counter (bit 22)
    pub enable: bool,

    /// Invert counter-mask comparison (bit 23); only meaningful together
    /// with a nonzero cmask
    pub invert: bool,

    /// Counter mask threshold (bits 24-31)
    pub cmask: u8,
}

impl RegisterLayout for CorePerfEvtSel {
    fn to_msr_value(&self) -> u64 {
        (self.event_select as u64)
            | ((self.umask as u64) << 8)
            | (if self.usr { 1 << 16 } else { 0 })
            | (if self.os { 1 << 17 } else { 0 })
            | (if self.edge { 1 << 18 } else { 0 })
            | (if self.pin_control { 1 << 19 } else { 0 })
            | (if self.interrupt { 1 << 20 } else { 0 })
            | (if self.any_thread { 1 << 21 } else { 0 })
            | (if self.enable { 1 << 22 } else { 0 })
            | (if self.invert { 1 << 23 } else { 0 })
            | ((self.cmask as u64) << 24)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            event_select: (value & 0xFF) as u8,
            umask: ((value >> 8) & 0xFF) as u8,
            usr: (value & (1 << 16)) != 0,
            os: (value & (1 << 17)) != 0,
            edge: (value & (1 << 18)) != 0,
            pin_control: (value & (1 << 19)) != 0,
            interrupt: (value & (1 << 20)) != 0,
            any_thread: (value & (1 << 21)) != 0,
            enable: (value & (1 << 22)) != 0,
            invert: (value & (1 << 23)) != 0,
            cmask: ((value >> 24) & 0xFF) as u8,
        }
    }
}

/// Hybrid-core Performance Event Select Register layout
///
/// Alder Lake and later hybrid parts keep the classic perfevtsel fields
/// and add a umask extension in bits 48-55, used by events whose sub-select
/// no longer fits in the original 8-bit umask.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridPerfEvtSel {
    /// Event select code (bits 0-7)
    pub event_select: u8,

    /// Unit mask (bits 8-15)
    pub umask: u8,

    /// Unit mask extension (bits 48-55)
    pub umask_ext: u8,

    /// Count in user mode (bit 16)
    pub usr: bool,

    /// Count in kernel mode (bit 17)
    pub os: bool,

    /// Edge detect (bit 18)
    pub edge: bool,

    /// APIC interrupt on overflow (bit 20)
    pub interrupt: bool,

    /// Enable counter (bit 22)
    pub enable: bool,

    /// Invert counter-mask comparison (bit 23)
    pub invert: bool,

    /// Counter mask threshold (bits 24-31)
    pub cmask: u8,
}

impl RegisterLayout for HybridPerfEvtSel {
    fn to_msr_value(&self) -> u64 {
        (self.event_select as u64)
            | ((self.umask as u64) << 8)
            | (if self.usr { 1 << 16 } else { 0 })
            | (if self.os { 1 << 17 } else { 0 })
            | (if self.edge { 1 << 18 } else { 0 })
            | (if self.interrupt { 1 << 20 } else { 0 })
            | (if self.enable { 1 << 22 } else { 0 })
            | (if self.invert { 1 << 23 } else { 0 })
            | ((self.cmask as u64) << 24)
            | ((self.umask_ext as u64) << 48)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            event_select: (value & 0xFF) as u8,
            umask: ((value >> 8) & 0xFF) as u8,
            umask_ext: ((value >> 48) & 0xFF) as u8,
            usr: (value & (1 << 16)) != 0,
            os: (value & (1 << 17)) != 0,
            edge: (value & (1 << 18)) != 0,
            interrupt: (value & (1 << 20)) != 0,
            enable: (value & (1 << 22)) != 0,
            invert: (value & (1 << 23)) != 0,
            cmask: ((value >> 24) & 0xFF) as u8,
        }
    }
}

/// Mode bits for one fixed-function counter
///
/// Each fixed counter owns a 4-bit field in IA32_FIXED_CTR_CTRL:
/// [pmi, any_thread, usr, os] from high to low.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCounterMode {
    /// Count in kernel mode
    pub os: bool,
    /// Count in user mode
    pub usr: bool,
    /// Count both SMT siblings
    pub any_thread: bool,
    /// APIC interrupt on overflow
    pub pmi: bool,
}

impl FixedCounterMode {
    /// User + kernel counting, no interrupts
    pub const fn user_and_kernel() -> Self {
        Self {
            os: true,
            usr: true,
            any_thread: false,
            pmi: false,
        }
    }

    fn nibble(&self) -> u64 {
        (if self.os { 1 } else { 0 })
            | (if self.usr { 1 << 1 } else { 0 })
            | (if self.any_thread { 1 << 2 } else { 0 })
            | (if self.pmi { 1 << 3 } else { 0 })
    }

    fn from_nibble(value: u64) -> Self {
        Self {
            os: (value & 1) != 0,
            usr: (value & (1 << 1)) != 0,
            any_thread: (value & (1 << 2)) != 0,
            pmi: (value & (1 << 3)) != 0,
        }
    }
}

/// Fixed Counter Control Register layout (IA32_FIXED_CTR_CTRL)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCounterControl {
    /// Mode bits per fixed counter, counter 0 in the low nibble
    pub counters: [FixedCounterMode; 3],
}

impl FixedCounterControl {
    /// All three fixed counters counting in user and kernel mode
    pub const fn all_user_and_kernel() -> Self {
        Self {
            counters: [FixedCounterMode::user_and_kernel(); 3],
        }
    }
}

impl RegisterLayout for FixedCounterControl {
    fn to_msr_value(&self) -> u64 {
        self.counters
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, mode)| acc | (mode.nibble() << (i * 4)))
    }

    fn from_msr_value(value: u64) -> Self {
        let mut counters = [FixedCounterMode::default(); 3];
        for (i, mode) in counters.iter_mut().enumerate() {
            *mode = FixedCounterMode::from_nibble((value >> (i * 4)) & 0xF);
        }
        Self { counters }
    }
}

/// Global Counter Control Register layout (IA32_PERF_GLOBAL_CTRL)
///
/// One enable bit per programmable counter in the low half, one per fixed
/// counter starting at bit 32.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalCounterControl {
    /// Enable mask for programmable counters (bit per counter from bit 0)
    pub pmc_enable: u8,

    /// Enable mask for fixed counters (bit per counter from bit 32)
    pub fixed_enable: u8,
}

impl GlobalCounterControl {
    /// Enable the first `pmc_count` programmable and `fixed_count` fixed
    /// counters
    pub const fn enable_all(pmc_count: usize, fixed_count: usize) -> Self {
        Self {
            pmc_enable: ((1u16 << pmc_count) - 1) as u8,
            fixed_enable: ((1u16 << fixed_count) - 1) as u8,
        }
    }
}

impl RegisterLayout for GlobalCounterControl {
    fn to_msr_value(&self) -> u64 {
        (self.pmc_enable as u64) | ((self.fixed_enable as u64) << 32)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            pmc_enable: (value & 0xFF) as u8,
            fixed_enable: ((value >> 32) & 0xFF) as u8,
        }
    }
}
