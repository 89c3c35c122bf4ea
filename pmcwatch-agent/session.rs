//! The monitoring session: owned state plus the configuration interface
//!
//! A [`MonitoringSession`] owns every piece of mutable monitoring state:
//! the per-unit normalized records, the running totals, the interval
//! bookkeeping, and the power sampler. Configurations are stateless tables
//! of events and formulas; they receive the session by reference for both
//! setup and each polling tick. Activating a different configuration
//! discards all per-unit state, since the registers get reprogrammed and
//! old deltas are meaningless.
//!
//! Initialize and update are invoked from a single control task; nothing
//! here is touched concurrently, and the records are safe to read between
//! ticks for display.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::common::topology::{CpuArchitecture, HardwareUnit, Topology};
use crate::engine::accumulator::{fold_into, reset_totals, CounterRecord};
use crate::engine::power::PowerSampler;
use crate::engine::programmer::CounterProgrammer;
use crate::engine::reader::{CounterSlot, NormalizationState, NormalizingReader};
use crate::engine::RegisterAccess;
use crate::error::Result;
use pmcwatch_raw::core::msr as core_msr;
use pmcwatch_raw::uncore::UncoreBoxMap;

/// One tick's worth of rendered output
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringUpdateResults {
    /// One row per monitored unit, matching the configuration's headers
    pub unit_rows: Vec<Vec<String>>,

    /// The totals row
    pub overall_row: Vec<String>,

    /// Unrendered totals for machine consumers (metrics export, JSON)
    pub overall_raw_values: Vec<(String, f64)>,
}

/// The contract every monitoring configuration implements
pub trait MonitoringConfig: Send + Sync {
    fn name(&self) -> &'static str;

    fn help_text(&self) -> &'static str;

    fn column_headers(&self) -> &'static [&'static str];

    /// Program the counters this configuration needs. Called once when the
    /// configuration becomes active.
    fn initialize(&self, session: &mut MonitoringSession) -> Result<()>;

    /// Drain the counters and produce display rows. Called once per tick.
    fn update(&self, session: &mut MonitoringSession) -> Result<MonitoringUpdateResults>;
}

/// Owned monitoring state for one machine
pub struct MonitoringSession {
    access: Arc<dyn RegisterAccess>,
    topology: Topology,
    /// CPU used for package-scoped registers (uncore boxes, RAPL)
    representative_cpu: u32,
    records: Vec<CounterRecord>,
    totals: CounterRecord,
    unit_norm: Vec<NormalizationState>,
    box_state: Vec<Vec<NormalizationState>>,
    power: PowerSampler,
    tick_at: Instant,
}

impl MonitoringSession {
    pub fn new(access: Arc<dyn RegisterAccess>, topology: Topology) -> Self {
        let representative_cpu = topology.units.first().map(|u| u.cpu).unwrap_or(0);
        Self {
            access,
            topology,
            representative_cpu,
            records: Vec::new(),
            totals: CounterRecord::default(),
            unit_norm: Vec::new(),
            box_state: Vec::new(),
            power: PowerSampler::new(representative_cpu),
            tick_at: Instant::now(),
        }
    }

    pub fn arch(&self) -> CpuArchitecture {
        self.topology.arch
    }

    pub fn is_hybrid(&self) -> bool {
        self.topology.arch.is_hybrid()
    }

    pub fn units(&self) -> &[HardwareUnit] {
        &self.topology.units
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn records(&self) -> &[CounterRecord] {
        &self.records
    }

    pub fn totals(&self) -> &CounterRecord {
        &self.totals
    }

    /// Make `config` the active configuration.
    ///
    /// All per-unit records and interval bookkeeping are discarded first;
    /// nothing carries over from a previously active configuration.
    pub fn activate(&mut self, config: &dyn MonitoringConfig) -> Result<()> {
        tracing::info!("Activating monitoring configuration: {}", config.name());
        self.records.clear();
        self.totals = CounterRecord::default();
        self.unit_norm.clear();
        self.box_state.clear();
        self.power.reset();
        config.initialize(self)
    }

    /// Run one polling tick against the active configuration
    pub fn update(&mut self, config: &dyn MonitoringConfig) -> Result<MonitoringUpdateResults> {
        self.update_at(config, Instant::now())
    }

    /// [`update`](Self::update) with an explicit tick timestamp
    pub fn update_at(
        &mut self,
        config: &dyn MonitoringConfig,
        now: Instant,
    ) -> Result<MonitoringUpdateResults> {
        self.tick_at = now;
        config.update(self)
    }

    /// Stop all core counters; call before exiting
    pub fn shutdown(&mut self) -> Result<()> {
        let programmer = CounterProgrammer::new(&*self.access);
        for unit in &self.topology.units {
            programmer.disable_core(unit.cpu)?;
        }
        Ok(())
    }

    // ---- helpers for core-PMU configurations ----

    /// Size the per-unit records for `slots` programmable counters
    pub fn init_core_records(&mut self, slots: usize) {
        let n = self.topology.units.len();
        self.records = (0..n).map(|_| CounterRecord::with_slots(slots)).collect();
        self.totals = CounterRecord::with_slots(slots);
        self.unit_norm = (0..n).map(|_| NormalizationState::new()).collect();
    }

    /// Program every unit's core PMU with the given encoded event selects.
    ///
    /// Selects beyond a unit's counter bank are dropped for that unit
    /// (hybrid efficiency cores have fewer counters). Reprogramming resets
    /// the interval bookkeeping: old deltas refer to different events.
    pub fn program_core_events(&mut self, selects: &[u64]) -> Result<()> {
        let programmer = CounterProgrammer::new(&*self.access);
        for unit in &self.topology.units {
            let layout = self.topology.arch.layout_for(unit.core_type);
            programmer.program_core(unit.cpu, &layout, selects)?;
        }

        for state in self.unit_norm.iter_mut() {
            *state = NormalizationState::new();
        }
        self.power.prime(&*self.access, Instant::now())?;
        Ok(())
    }

    /// Drain and normalize every unit's core counters, folding totals.
    ///
    /// `slots` is the number of programmable counters the active
    /// configuration uses.
    pub fn collect_core(&mut self, slots: usize) -> Result<()> {
        let now = self.tick_at;
        reset_totals(&mut self.totals);

        let reader = NormalizingReader::new(&*self.access);
        for (i, unit) in self.topology.units.iter().enumerate() {
            let layout = self.topology.arch.layout_for(unit.core_type);
            let width = layout.counter_width;
            let factor = self.unit_norm[i].factor_at(now);

            let instructions = reader.read_and_clear(CounterSlot {
                cpu: unit.cpu,
                address: core_msr::fixed_ctr(0),
                width,
            })? as f64;
            let active_cycles = reader.read_and_clear(CounterSlot {
                cpu: unit.cpu,
                address: core_msr::fixed_ctr(1),
                width,
            })? as f64;
            let ref_cycles = reader.read_and_clear(CounterSlot {
                cpu: unit.cpu,
                address: core_msr::fixed_ctr(2),
                width,
            })? as f64;

            let record = &mut self.records[i];
            record.instructions = instructions * factor;
            record.active_cycles = active_cycles * factor;
            record.ref_cycles = ref_cycles * factor;

            let programmed = slots.min(layout.programmable_counters);
            for c in 0..programmed {
                let raw = reader.read_and_clear(CounterSlot {
                    cpu: unit.cpu,
                    address: core_msr::pmc(c),
                    width,
                })?;
                record.pmc[c] = raw as f64 * factor;
            }
            for c in programmed..record.pmc.len() {
                record.pmc[c] = 0.0;
            }

            self.unit_norm[i].advance(0, now);
            fold_into(&mut self.totals, &self.records[i]);
        }

        Ok(())
    }

    /// Sample package power into the totals record.
    ///
    /// Package power is one global measurement, not a per-unit quantity,
    /// so it overwrites the totals fields rather than accumulating.
    pub fn sample_power(&mut self) -> Result<()> {
        let sample = self.power.sample(&*self.access, self.tick_at)?;
        self.totals.package_watts = sample.package_watts;
        self.totals.pp0_watts = sample.pp0_watts;
        Ok(())
    }

    // ---- helpers for uncore configurations ----

    /// Size the per-box records and delta bookkeeping
    pub fn init_box_records(&mut self, box_count: usize, counters: usize) {
        self.records = (0..box_count)
            .map(|_| CounterRecord::with_slots(counters))
            .collect();
        self.totals = CounterRecord::with_slots(counters);
        self.unit_norm.clear();
        self.box_state = (0..box_count)
            .map(|_| (0..counters).map(|_| NormalizationState::new()).collect())
            .collect();
    }

    /// Program `box_count` boxes of the given family with the encoded
    /// counter controls
    pub fn program_boxes(
        &mut self,
        map: &UncoreBoxMap,
        box_count: usize,
        selects: &[u64],
    ) -> Result<()> {
        let programmer = CounterProgrammer::new(&*self.access);
        for b in 0..box_count.min(map.max_boxes) {
            programmer.program_box(self.representative_cpu, map, b, box_count, selects)?;
        }
        for per_box in self.box_state.iter_mut() {
            for state in per_box.iter_mut() {
                *state = NormalizationState::new();
            }
        }
        Ok(())
    }

    /// Program the client-uncore arbiter block
    pub fn program_arbiter(&mut self, selects: &[u64]) -> Result<()> {
        let programmer = CounterProgrammer::new(&*self.access);
        programmer.program_arbiter(self.representative_cpu, selects)?;
        for per_box in self.box_state.iter_mut() {
            for state in per_box.iter_mut() {
                *state = NormalizationState::new();
            }
        }
        Ok(())
    }

    /// Sample and normalize every box's counters, folding totals.
    ///
    /// Box counters keep running between ticks; each sample is differenced
    /// against the previous one with width-aware wraparound.
    pub fn collect_boxes(&mut self, map: &UncoreBoxMap, box_count: usize) -> Result<()> {
        let now = self.tick_at;
        reset_totals(&mut self.totals);

        let reader = NormalizingReader::new(&*self.access);
        for b in 0..box_count.min(self.records.len()) {
            let record = &mut self.records[b];
            let counters = map.counters_per_box.min(record.pmc.len());
            for c in 0..counters {
                let state = &mut self.box_state[b][c];
                let factor = state.factor_at(now);
                let delta = reader.read_delta(
                    CounterSlot {
                        cpu: self.representative_cpu,
                        address: map.counter(b, c),
                        width: map.counter_width,
                    },
                    state,
                    now,
                )?;
                record.pmc[c] = delta as f64 * factor;
            }
            fold_into(&mut self.totals, &self.records[b]);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::topology::{CoreType, CpuArchitecture, HardwareUnit, Topology};
    use crate::engine::mock::MockAccess;

    struct NopConfig;

    impl MonitoringConfig for NopConfig {
        fn name(&self) -> &'static str {
            "nop"
        }
        fn help_text(&self) -> &'static str {
            "does nothing"
        }
        fn column_headers(&self) -> &'static [&'static str] {
            &["Unit"]
        }
        fn initialize(&self, session: &mut MonitoringSession) -> Result<()> {
            session.init_core_records(2);
            Ok(())
        }
        fn update(&self, _session: &mut MonitoringSession) -> Result<MonitoringUpdateResults> {
            Ok(MonitoringUpdateResults {
                unit_rows: vec![],
                overall_row: vec![],
                overall_raw_values: vec![],
            })
        }
    }

    fn test_session() -> MonitoringSession {
        let topology = Topology {
            arch: CpuArchitecture::Skylake,
            units: vec![
                HardwareUnit {
                    cpu: 0,
                    core_type: CoreType::Performance,
                },
                HardwareUnit {
                    cpu: 1,
                    core_type: CoreType::Performance,
                },
            ],
        };
        MonitoringSession::new(Arc::new(MockAccess::new()), topology)
    }

    #[test]
    fn test_activate_resets_state() {
        let mut session = test_session();
        session.activate(&NopConfig).unwrap();
        assert_eq!(session.records().len(), 2);

        // Dirty the totals, then re-activate: everything starts fresh
        session.totals.instructions = 99.0;
        session.activate(&NopConfig).unwrap();
        assert_eq!(session.totals().instructions, 0.0);
        assert!(session.records().iter().all(|r| r.instructions == 0.0));
    }

    #[test]
    fn test_init_box_records_shapes_state() {
        let mut session = test_session();
        session.init_box_records(3, 4);
        assert_eq!(session.records().len(), 3);
        assert_eq!(session.records()[0].pmc.len(), 4);
        assert_eq!(session.box_state.len(), 3);
        assert_eq!(session.box_state[2].len(), 4);
    }
}
