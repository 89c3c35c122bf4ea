//! The per-architecture monitoring-configuration catalog
//!
//! Each architecture contributes a set of declarative event tables; one
//! generic [`CoreTableConfig`] turns any such table into a working
//! [`MonitoringConfig`]. The tables differ only in event encodings and
//! display formulas, never in control flow.
//!
//! Metric arithmetic here is cosmetic: a zero denominator yields NaN or
//! infinity in the rendered string, never a panic.

pub mod alderlake;
pub mod arrowlake;
pub mod goldmontplus;
pub mod haswell;
pub mod sandybridge;
pub mod skylake;
pub mod uncore;

use pmcwatch_raw::core::{CorePerfEvtSel, HybridPerfEvtSel};
use pmcwatch_raw::register::RegisterLayout;

use crate::common::topology::CpuArchitecture;
use crate::engine::accumulator::CounterRecord;
use crate::error::Result;
use crate::session::{MonitoringConfig, MonitoringSession, MonitoringUpdateResults};

/// All configurations applicable to the given architecture
pub fn catalog(arch: CpuArchitecture) -> Vec<Box<dyn MonitoringConfig>> {
    match arch {
        CpuArchitecture::SandyBridge => {
            let mut configs = sandybridge::configs();
            configs.extend(uncore::sandy_bridge_configs());
            configs
        }
        CpuArchitecture::Haswell => haswell::configs(),
        CpuArchitecture::Skylake => {
            let mut configs = skylake::configs();
            configs.extend(uncore::skylake_configs());
            configs
        }
        CpuArchitecture::GoldmontPlus => goldmontplus::configs(),
        CpuArchitecture::AlderLake => alderlake::configs(),
        CpuArchitecture::ArrowLake => arrowlake::configs(),
        CpuArchitecture::Unknown => Vec::new(),
    }
}

/// One programmable-counter event in a declarative table
#[derive(Debug, Clone, Copy)]
pub struct CoreEvent {
    pub name: &'static str,
    pub event: u8,
    pub umask: u8,
    pub umask_ext: u8,
    pub cmask: u8,
    pub edge: bool,
    pub invert: bool,
}

impl CoreEvent {
    pub const fn new(name: &'static str, event: u8, umask: u8) -> Self {
        Self {
            name,
            event,
            umask,
            umask_ext: 0,
            cmask: 0,
            edge: false,
            invert: false,
        }
    }
}

/// Encode one event for the architecture's perfevtsel flavor.
///
/// Counting covers user and kernel mode; the hybrid flavor carries the
/// umask extension that the classic layout has no room for.
pub fn encode_core_event(hybrid: bool, e: &CoreEvent) -> u64 {
    if hybrid {
        HybridPerfEvtSel {
            event_select: e.event,
            umask: e.umask,
            umask_ext: e.umask_ext,
            usr: true,
            os: true,
            edge: e.edge,
            invert: e.invert,
            cmask: e.cmask,
            enable: true,
            ..Default::default()
        }
        .to_msr_value()
    } else {
        CorePerfEvtSel {
            event_select: e.event,
            umask: e.umask,
            usr: true,
            os: true,
            edge: e.edge,
            invert: e.invert,
            cmask: e.cmask,
            enable: true,
            ..Default::default()
        }
        .to_msr_value()
    }
}

/// A declarative core-PMU monitoring configuration
pub struct CoreEventTable {
    pub name: &'static str,
    pub help: &'static str,
    pub headers: &'static [&'static str],
    pub events: &'static [CoreEvent],
    /// Render one row (per-unit or totals) from a record
    pub format_row: fn(label: &str, record: &CounterRecord) -> Vec<String>,
    /// Unrendered totals for machine consumers
    pub overall_raw: fn(totals: &CounterRecord) -> Vec<(String, f64)>,
}

/// Generic engine driver for a [`CoreEventTable`]
pub struct CoreTableConfig {
    pub table: &'static CoreEventTable,
}

impl MonitoringConfig for CoreTableConfig {
    fn name(&self) -> &'static str {
        self.table.name
    }

    fn help_text(&self) -> &'static str {
        self.table.help
    }

    fn column_headers(&self) -> &'static [&'static str] {
        self.table.headers
    }

    fn initialize(&self, session: &mut MonitoringSession) -> Result<()> {
        let hybrid = session.is_hybrid();
        let selects: Vec<u64> = self
            .table
            .events
            .iter()
            .map(|e| encode_core_event(hybrid, e))
            .collect();

        session.init_core_records(self.table.events.len());
        session.program_core_events(&selects)
    }

    fn update(&self, session: &mut MonitoringSession) -> Result<MonitoringUpdateResults> {
        session.collect_core(self.table.events.len())?;
        session.sample_power()?;

        let hybrid = session.is_hybrid();
        let unit_rows = session
            .units()
            .iter()
            .zip(session.records().iter())
            .map(|(unit, record)| (self.table.format_row)(&unit.label(hybrid), record))
            .collect();

        let overall_row = (self.table.format_row)("Overall", session.totals());
        let overall_raw_values = (self.table.overall_raw)(session.totals());

        Ok(MonitoringUpdateResults {
            unit_rows,
            overall_row,
            overall_raw_values,
        })
    }
}

// ---- shared display formulas ----

/// "1.23 G", "45.6 M", "789 K", trailing plain numbers below a thousand
pub fn format_large_number(x: f64) -> String {
    let magnitude = x.abs();
    if magnitude >= 1e12 {
        format!("{:.2} T", x / 1e12)
    } else if magnitude >= 1e9 {
        format!("{:.2} G", x / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.2} M", x / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.2} K", x / 1e3)
    } else {
        format!("{x:.2}")
    }
}

pub fn format_percent(x: f64) -> String {
    format!("{x:.2}%")
}

/// Events per thousand retired instructions
pub fn per_kilo_instruction(events: f64, instructions: f64) -> f64 {
    events / (instructions / 1000.0)
}

/// The leading columns every core table shares: label, cycles,
/// instructions, IPC
pub fn base_columns(label: &str, r: &CounterRecord) -> Vec<String> {
    vec![
        label.to_string(),
        format_large_number(r.active_cycles),
        format_large_number(r.instructions),
        format!("{:.2}", r.ipc()),
    ]
}

pub const BPU_HEADERS: &[&str] = &[
    "Unit",
    "Active Cycles",
    "Instructions",
    "IPC",
    "BPU Acc",
    "Branch MPKI",
    "% Branches",
    "BAClears/Ki",
];

/// Row formula for branch-prediction tables: pmc\[0\] = retired branches,
/// pmc\[1\] = mispredicted branches, pmc\[2\] = BAClears
pub fn bpu_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let branches = r.pmc[0];
    let mispredicted = r.pmc[1];
    let baclears = r.pmc.get(2).copied().unwrap_or(0.0);

    let mut row = base_columns(label, r);
    row.push(format_percent((1.0 - mispredicted / branches) * 100.0));
    row.push(format!(
        "{:.2}",
        per_kilo_instruction(mispredicted, r.instructions)
    ));
    row.push(format_percent(branches / r.instructions * 100.0));
    row.push(format!(
        "{:.2}",
        per_kilo_instruction(baclears, r.instructions)
    ));
    row
}

pub fn bpu_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
        ("retired_branches".to_string(), totals.pmc[0]),
        ("mispredicted_branches".to_string(), totals.pmc[1]),
        ("package_watts".to_string(), totals.package_watts),
    ]
}

/// Cacheline traffic rendered as bytes per second
pub fn format_bandwidth(cachelines_per_sec: f64) -> String {
    format!("{}B/s", format_large_number(cachelines_per_sec * 64.0))
}

pub const L2_CACHE_HEADERS: &[&str] = &[
    "Unit",
    "Active Cycles",
    "Instructions",
    "IPC",
    "L2 Hitrate",
    "L2 Hit BW",
    "L2 MPKI",
];

pub const L3_CACHE_HEADERS: &[&str] = &[
    "Unit",
    "Active Cycles",
    "Instructions",
    "IPC",
    "L3 Hitrate",
    "L3 Hit BW",
    "L3 MPKI",
];

/// Row formula for reference/miss cache tables: pmc\[0\] = references,
/// pmc\[1\] = misses
pub fn cache_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let references = r.pmc[0];
    let misses = r.pmc[1];
    let hits = references - misses;

    let mut row = base_columns(label, r);
    row.push(format_percent(hits / references * 100.0));
    row.push(format_bandwidth(hits));
    row.push(format!("{:.2}", per_kilo_instruction(misses, r.instructions)));
    row
}

pub fn cache_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
        ("cache_references".to_string(), totals.pmc[0]),
        ("cache_misses".to_string(), totals.pmc[1]),
        ("package_watts".to_string(), totals.package_watts),
    ]
}

/// Row formula for port-utilization tables: each counter as a percentage
/// of active cycles
pub fn ports_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let mut row = base_columns(label, r);
    for &uops in r.pmc.iter() {
        row.push(format_percent(uops / r.active_cycles * 100.0));
    }
    row
}

pub fn ports_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    let mut values = vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
    ];
    for (i, &uops) in totals.pmc.iter().enumerate() {
        values.push((format!("port{i}_uops"), uops));
    }
    values
}

pub const POWER_HEADERS: &[&str] = &[
    "Unit",
    "Active Cycles",
    "Instructions",
    "IPC",
    "Ref Cycles",
    "Pkg W",
    "PP0 W",
];

/// Row formula for the power tables: no programmable events, fixed
/// counters plus the RAPL sample carried on the totals record
pub fn power_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let mut row = base_columns(label, r);
    row.push(format_large_number(r.ref_cycles));
    row.push(format!("{:.2}", r.package_watts));
    row.push(format!("{:.2}", r.pp0_watts));
    row
}

pub fn power_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
        ("ref_cycles".to_string(), totals.ref_cycles),
        ("package_watts".to_string(), totals.package_watts),
        ("pp0_watts".to_string(), totals.pp0_watts),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::topology::{CoreType, HardwareUnit, Topology};
    use crate::engine::mock::MockAccess;
    use crate::session::MonitoringSession;
    use pmcwatch_raw::core::msr as core_msr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_format_large_number() {
        assert_eq!(format_large_number(1_234_000_000.0), "1.23 G");
        assert_eq!(format_large_number(45_600_000.0), "45.60 M");
        assert_eq!(format_large_number(789.0), "789.00");
    }

    #[test]
    fn test_division_by_zero_renders_not_panics() {
        let record = CounterRecord::with_slots(3);
        let row = bpu_row("cpu0", &record);
        // IPC and accuracy are NaN with everything zero; the row still
        // renders
        assert_eq!(row.len(), BPU_HEADERS.len());
        assert!(row[3].contains("NaN"));
    }

    /// Two one-second ticks of a branch-prediction configuration against
    /// the mock register file, checking the rendered metrics end to end.
    #[test]
    fn test_branch_prediction_two_tick_scenario() {
        let mock = Arc::new(MockAccess::new());
        let topology = Topology {
            arch: crate::common::topology::CpuArchitecture::Skylake,
            units: vec![HardwareUnit {
                cpu: 0,
                core_type: CoreType::Performance,
            }],
        };

        let mut session = MonitoringSession::new(mock.clone(), topology);
        let config = CoreTableConfig {
            table: &skylake::BRANCH_PREDICTION,
        };
        session.activate(&config).unwrap();

        let t0 = Instant::now();

        // First second: 1.0M branches retired, 50K mispredicted, 10M
        // instructions
        mock.set(0, core_msr::fixed_ctr(0), 10_000_000);
        mock.set(0, core_msr::fixed_ctr(1), 8_000_000);
        mock.set(0, core_msr::pmc(0), 1_000_000);
        mock.set(0, core_msr::pmc(1), 50_000);
        let first = session.update_at(&config, t0).unwrap();
        assert_eq!(first.unit_rows.len(), 1);

        // Second second: counters were drained, so the registers hold the
        // increments 1.0M->1.2M and 50K->54K, with 2M more instructions
        mock.set(0, core_msr::fixed_ctr(0), 2_000_000);
        mock.set(0, core_msr::fixed_ctr(1), 1_600_000);
        mock.set(0, core_msr::pmc(0), 200_000);
        mock.set(0, core_msr::pmc(1), 4_000);
        let second = session
            .update_at(&config, t0 + Duration::from_secs(1))
            .unwrap();

        let row = &second.unit_rows[0];
        // (1 - 4000/200000) * 100 = 98% prediction accuracy
        assert_eq!(row[4], "98.00%");
        // 4000 mispredicts over 2M instructions = 2 MPKI
        assert_eq!(row[5], "2.00");
        // 200K branches over 2M instructions
        assert_eq!(row[6], "10.00%");
        // IPC = 2.0M / 1.6M
        assert_eq!(row[3], "1.25");

        // A single unit's totals match the unit row
        assert_eq!(second.overall_row[4], "98.00%");
        let raw: std::collections::HashMap<_, _> =
            second.overall_raw_values.into_iter().collect();
        assert_eq!(raw["retired_branches"], 200_000.0);
        assert_eq!(raw["mispredicted_branches"], 4_000.0);
    }
}
