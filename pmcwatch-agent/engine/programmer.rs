//! Counter programming for core PMUs and uncore boxes

use pmcwatch_raw::core::{
    msr as core_msr, FixedCounterControl, GlobalCounterControl,
};
use pmcwatch_raw::register::RegisterLayout;
use pmcwatch_raw::uncore::{arb, UncoreBoxControl, UncoreBoxMap};

use crate::common::topology::PmuLayout;
use crate::engine::RegisterAccess;
use crate::error::Result;

/// Programs event selections into core PMUs and uncore boxes
pub struct CounterProgrammer<'a> {
    access: &'a dyn RegisterAccess,
}

impl<'a> CounterProgrammer<'a> {
    pub fn new(access: &'a dyn RegisterAccess) -> Self {
        Self { access }
    }

    /// Program one core PMU: disable, select events, clear, enable.
    ///
    /// `selects` holds pre-encoded perfevtsel values; counters beyond its
    /// length are left disabled. The underlying register access pins the
    /// calling thread to `cpu`, so none of these writes can land on a
    /// different core's bank.
    pub fn program_core(&self, cpu: u32, layout: &PmuLayout, selects: &[u64]) -> Result<()> {
        // Quiesce everything before touching the selects
        self.access
            .write(cpu, core_msr::IA32_PERF_GLOBAL_CTRL, 0)?;

        self.access.write(
            cpu,
            core_msr::IA32_FIXED_CTR_CTRL,
            FixedCounterControl::all_user_and_kernel().to_msr_value(),
        )?;

        let programmed = selects.len().min(layout.programmable_counters);
        for (i, &value) in selects.iter().take(programmed).enumerate() {
            self.write_event_select(cpu, i, value)?;
        }

        // Start all counters from zero
        for i in 0..layout.fixed_counters {
            self.access.write(cpu, core_msr::fixed_ctr(i), 0)?;
        }
        for i in 0..layout.programmable_counters {
            self.access.write(cpu, core_msr::pmc(i), 0)?;
        }

        let ctrl = GlobalCounterControl::enable_all(programmed, layout.fixed_counters);
        self.access
            .write(cpu, core_msr::IA32_PERF_GLOBAL_CTRL, ctrl.to_msr_value())?;

        Ok(())
    }

    /// Write one encoded event select to a core PMU counter slot
    pub fn write_event_select(&self, cpu: u32, index: usize, value: u64) -> Result<()> {
        self.access.write(cpu, core_msr::perfevtsel(index), value)
    }

    /// Stop all counters on one core PMU
    pub fn disable_core(&self, cpu: u32) -> Result<()> {
        self.access.write(cpu, core_msr::IA32_PERF_GLOBAL_CTRL, 0)
    }

    /// Program one uncore box.
    ///
    /// The box must be frozen before its counters are cleared, or in-flight
    /// increments are lost, and must be unfrozen afterwards, or it stalls
    /// permanently. The required order is:
    ///
    /// 1. arm the freeze signal
    /// 2. freeze
    /// 3. write the counter controls
    /// 4. clear the counters
    /// 5. unfreeze
    ///
    /// A `box_index` at or beyond `box_count` is a silent no-op: hardware
    /// routinely reports fewer live boxes than the architectural maximum,
    /// and the addresses past the live ones must not be touched.
    pub fn program_box(
        &self,
        cpu: u32,
        map: &UncoreBoxMap,
        box_index: usize,
        box_count: usize,
        selects: &[u64],
    ) -> Result<()> {
        if box_index >= box_count {
            tracing::debug!(
                "Skipping box {} (hardware reports {} boxes)",
                box_index,
                box_count
            );
            return Ok(());
        }

        let box_ctl = map.box_ctl(box_index);

        self.access
            .write(cpu, box_ctl, UncoreBoxControl::freeze_enabled().to_msr_value())?;
        self.access
            .write(cpu, box_ctl, UncoreBoxControl::frozen().to_msr_value())?;

        for (c, &value) in selects.iter().take(map.counters_per_box).enumerate() {
            self.access
                .write(cpu, map.counter_ctl(box_index, c), value)?;
        }

        self.access.write(
            cpu,
            box_ctl,
            UncoreBoxControl::frozen_and_cleared().to_msr_value(),
        )?;
        self.access
            .write(cpu, box_ctl, UncoreBoxControl::unfrozen().to_msr_value())?;

        Ok(())
    }

    /// Program the client-uncore arbiter block.
    ///
    /// Client parts have no per-box freeze control; the block is gated by a
    /// global enable instead, and its counters are writable directly.
    pub fn program_arbiter(&self, cpu: u32, selects: &[u64]) -> Result<()> {
        for (c, &value) in selects.iter().take(arb::ARB_COUNTERS).enumerate() {
            self.access.write(cpu, arb::counter_ctl(c), value)?;
            self.access.write(cpu, arb::counter(c), 0)?;
        }
        self.access
            .write(cpu, arb::MSR_UNC_PERF_GLOBAL_CTRL, arb::GLOBAL_ENABLE_BIT)?;
        Ok(())
    }
}
