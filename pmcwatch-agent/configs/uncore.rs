//! Uncore monitoring configurations: cache boxes, PCU, and the client
//! arbiter
//!
//! Box counters are free-running; every tick is differenced against the
//! previous sample rather than drained, and programming goes through the
//! freeze/clear/unfreeze box sequence.

use pmcwatch_raw::pcu::{self, PcuCounterControl, SANDY_BRIDGE_PCU};
use pmcwatch_raw::register::RegisterLayout;
use pmcwatch_raw::uncore::{arb, UncoreBoxMap, UncoreCounterControl, SANDY_BRIDGE_CBO, SKYLAKE_CHA};

use super::{format_large_number, format_percent};
use crate::common::topology::CpuArchitecture;
use crate::engine::accumulator::CounterRecord;
use crate::error::Result;
use crate::session::{MonitoringConfig, MonitoringSession, MonitoringUpdateResults};

pub fn skylake_configs() -> Vec<Box<dyn MonitoringConfig>> {
    vec![
        Box::new(UncoreTableConfig { table: &SKX_CHA }),
        Box::new(ArbiterConfig),
    ]
}

pub fn sandy_bridge_configs() -> Vec<Box<dyn MonitoringConfig>> {
    vec![
        Box::new(UncoreTableConfig { table: &SNB_CBO }),
        Box::new(UncoreTableConfig { table: &SNB_PCU }),
    ]
}

/// One programmable-counter event in an uncore box
#[derive(Debug, Clone, Copy)]
pub struct UncoreEvent {
    pub name: &'static str,
    pub event: u8,
    pub umask: u8,
    /// PCU occupancy sub-counter select; unused elsewhere
    pub occupancy_select: u8,
}

impl UncoreEvent {
    pub const fn new(name: &'static str, event: u8, umask: u8) -> Self {
        Self {
            name,
            event,
            umask,
            occupancy_select: 0,
        }
    }

    pub const fn occupancy(name: &'static str, event: u8, occupancy_select: u8) -> Self {
        Self {
            name,
            event,
            umask: 0,
            occupancy_select,
        }
    }
}

fn encode_box_event(e: &UncoreEvent) -> u64 {
    UncoreCounterControl {
        event_select: e.event,
        umask: e.umask,
        enable: true,
        ..Default::default()
    }
    .to_msr_value()
}

fn encode_pcu_event(e: &UncoreEvent) -> u64 {
    PcuCounterControl {
        event_select: e.event,
        occupancy_select: e.occupancy_select,
        enable: true,
        ..Default::default()
    }
    .to_msr_value()
}

/// A declarative uncore-box monitoring configuration
pub struct UncoreEventTable {
    pub name: &'static str,
    pub help: &'static str,
    pub headers: &'static [&'static str],
    pub map: &'static UncoreBoxMap,
    pub events: &'static [UncoreEvent],
    pub encode: fn(&UncoreEvent) -> u64,
    pub box_count: fn(CpuArchitecture) -> usize,
    pub box_label: &'static str,
    pub format_row: fn(label: &str, record: &CounterRecord) -> Vec<String>,
    pub overall_raw: fn(totals: &CounterRecord) -> Vec<(String, f64)>,
}

/// Generic engine driver for an [`UncoreEventTable`]
pub struct UncoreTableConfig {
    pub table: &'static UncoreEventTable,
}

impl UncoreTableConfig {
    fn box_count(&self, session: &MonitoringSession) -> usize {
        (self.table.box_count)(session.arch()).min(self.table.map.max_boxes)
    }
}

impl MonitoringConfig for UncoreTableConfig {
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
        let count = self.box_count(session);
        let selects: Vec<u64> = self
            .table
            .events
            .iter()
            .map(|e| (self.table.encode)(e))
            .collect();

        session.init_box_records(count, self.table.events.len());
        session.program_boxes(self.table.map, count, &selects)
    }

    fn update(&self, session: &mut MonitoringSession) -> Result<MonitoringUpdateResults> {
        let count = self.box_count(session);
        session.collect_boxes(self.table.map, count)?;

        let unit_rows = session
            .records()
            .iter()
            .enumerate()
            .map(|(b, record)| {
                (self.table.format_row)(&format!("{} {}", self.table.box_label, b), record)
            })
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

// ---- Skylake-SP CHA ----

fn skx_cha_count(arch: CpuArchitecture) -> usize {
    arch.cache_box_count().unwrap_or(0)
}

static SKX_CHA: UncoreEventTable = UncoreEventTable {
    name: "L3 Cache (CHA)",
    help: "Per-CHA LLC lookup traffic and uncore clock",
    headers: &[
        "Unit",
        "Uncore Clk",
        "Lookups/s",
        "Reads/s",
        "Writes/s",
        "Read %",
    ],
    map: &SKYLAKE_CHA,
    events: &[
        UncoreEvent::new("Clockticks", 0x00, 0x00),
        // LLC_LOOKUP.ANY / .READ / .WRITE
        UncoreEvent::new("LlcLookupAny", 0x34, 0x11),
        UncoreEvent::new("LlcLookupRead", 0x34, 0x03),
        UncoreEvent::new("LlcLookupWrite", 0x34, 0x05),
    ],
    encode: encode_box_event,
    box_count: skx_cha_count,
    box_label: "CHA",
    format_row: cha_row,
    overall_raw: cha_raw,
};

fn cha_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let clockticks = r.pmc[0];
    let lookups = r.pmc[1];
    let reads = r.pmc[2];
    let writes = r.pmc[3];

    vec![
        label.to_string(),
        format_large_number(clockticks),
        format_large_number(lookups),
        format_large_number(reads),
        format_large_number(writes),
        format_percent(reads / lookups * 100.0),
    ]
}

fn cha_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("uncore_clockticks".to_string(), totals.pmc[0]),
        ("llc_lookups".to_string(), totals.pmc[1]),
        ("llc_lookup_reads".to_string(), totals.pmc[2]),
        ("llc_lookup_writes".to_string(), totals.pmc[3]),
    ]
}

// ---- Sandy Bridge-EP CBo ----

fn snb_cbo_count(arch: CpuArchitecture) -> usize {
    arch.cache_box_count().unwrap_or(0)
}

static SNB_CBO: UncoreEventTable = UncoreEventTable {
    name: "L3 Cache (CBo)",
    help: "Per-CBo LLC lookup and victim traffic",
    headers: &[
        "Unit",
        "Uncore Clk",
        "Lookups/s",
        "M Victims/s",
        "E Victims/s",
        "Dirty Victim %",
    ],
    map: &SANDY_BRIDGE_CBO,
    events: &[
        UncoreEvent::new("Clockticks", 0x00, 0x00),
        // LLC_LOOKUP.ANY
        UncoreEvent::new("LlcLookupAny", 0x34, 0x11),
        // LLC_VICTIMS.M_STATE / .E_STATE
        UncoreEvent::new("LlcVictimsM", 0x37, 0x01),
        UncoreEvent::new("LlcVictimsE", 0x37, 0x02),
    ],
    encode: encode_box_event,
    box_count: snb_cbo_count,
    box_label: "CBo",
    format_row: cbo_row,
    overall_raw: cbo_raw,
};

fn cbo_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let clockticks = r.pmc[0];
    let lookups = r.pmc[1];
    let victims_m = r.pmc[2];
    let victims_e = r.pmc[3];

    vec![
        label.to_string(),
        format_large_number(clockticks),
        format_large_number(lookups),
        format_large_number(victims_m),
        format_large_number(victims_e),
        format_percent(victims_m / (victims_m + victims_e) * 100.0),
    ]
}

fn cbo_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("uncore_clockticks".to_string(), totals.pmc[0]),
        ("llc_lookups".to_string(), totals.pmc[1]),
        ("llc_victims_m".to_string(), totals.pmc[2]),
        ("llc_victims_e".to_string(), totals.pmc[3]),
    ]
}

// ---- Sandy Bridge-EP PCU ----

fn one_box(_arch: CpuArchitecture) -> usize {
    1
}

static SNB_PCU: UncoreEventTable = UncoreEventTable {
    name: "Power Control Unit",
    help: "Frequency-limit residency and C0 occupancy from the PCU",
    headers: &[
        "Unit",
        "P-State Trans Clk/s",
        "Thermal Limit Clk/s",
        "Power Limit Clk/s",
        "C0 Core-Clk/s",
    ],
    map: &SANDY_BRIDGE_PCU,
    events: &[
        UncoreEvent::new("FreqTransCycles", pcu::events::FREQ_TRANS_CYCLES, 0x00),
        UncoreEvent::new(
            "ThermalLimitCycles",
            pcu::events::FREQ_MAX_LIMIT_THERMAL_CYCLES,
            0x00,
        ),
        UncoreEvent::new("PowerLimitCycles", pcu::events::FREQ_MAX_POWER_CYCLES, 0x00),
        UncoreEvent::occupancy(
            "CoresInC0",
            pcu::events::POWER_STATE_OCCUPANCY,
            pcu::occupancy::C0,
        ),
    ],
    encode: encode_pcu_event,
    box_count: one_box,
    box_label: "PCU",
    format_row: pcu_row,
    overall_raw: pcu_raw,
};

fn pcu_row(label: &str, r: &CounterRecord) -> Vec<String> {
    vec![
        label.to_string(),
        format_large_number(r.pmc[0]),
        format_large_number(r.pmc[1]),
        format_large_number(r.pmc[2]),
        format_large_number(r.pmc[3]),
    ]
}

fn pcu_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("freq_trans_cycles".to_string(), totals.pmc[0]),
        ("thermal_limit_cycles".to_string(), totals.pmc[1]),
        ("power_limit_cycles".to_string(), totals.pmc[2]),
        ("cores_in_c0".to_string(), totals.pmc[3]),
    ]
}

// ---- Client arbiter ----

/// Address map for the single client arbiter block; it has no box control,
/// so programming goes through the global enable instead
static ARB_MAP: UncoreBoxMap = UncoreBoxMap {
    box_ctl_base: 0,
    counter_ctl_base: arb::MSR_UNC_ARB_PERFEVTSEL0,
    counter_base: arb::MSR_UNC_ARB_PERFCTR0,
    box_stride: 0,
    counters_per_box: arb::ARB_COUNTERS,
    counter_width: arb::ARB_COUNTER_WIDTH,
    max_boxes: 1,
};

/// System-agent arbiter monitoring on client parts
pub struct ArbiterConfig;

impl MonitoringConfig for ArbiterConfig {
    fn name(&self) -> &'static str {
        "Arbiter"
    }

    fn help_text(&self) -> &'static str {
        "System-agent request tracker: occupancy, request rate, queue latency"
    }

    fn column_headers(&self) -> &'static [&'static str] {
        &["Unit", "Requests/s", "Occupancy", "Avg Queue Latency"]
    }

    fn initialize(&self, session: &mut MonitoringSession) -> Result<()> {
        let selects = [
            encode_box_event(&UncoreEvent::new(
                "TrackerOccupancy",
                arb::EVENT_TRK_OCCUPANCY,
                0x01,
            )),
            encode_box_event(&UncoreEvent::new(
                "TrackerRequests",
                arb::EVENT_TRK_REQUESTS,
                0x01,
            )),
        ];
        session.init_box_records(1, arb::ARB_COUNTERS);
        session.program_arbiter(&selects)
    }

    fn update(&self, session: &mut MonitoringSession) -> Result<MonitoringUpdateResults> {
        session.collect_boxes(&ARB_MAP, 1)?;

        let row = |label: &str, r: &CounterRecord| -> Vec<String> {
            let occupancy = r.pmc[0];
            let requests = r.pmc[1];
            vec![
                label.to_string(),
                format_large_number(requests),
                format_large_number(occupancy),
                // Occupancy-over-inserts, in uncore clocks
                format!("{:.1} clk", occupancy / requests),
            ]
        };

        let totals = session.totals();
        let overall_row = row("Overall", totals);
        let overall_raw_values = vec![
            ("arb_occupancy".to_string(), totals.pmc[0]),
            ("arb_requests".to_string(), totals.pmc[1]),
        ];
        let unit_rows = session
            .records()
            .iter()
            .map(|r| row("ARB", r))
            .collect();

        Ok(MonitoringUpdateResults {
            unit_rows,
            overall_row,
            overall_raw_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::topology::{CoreType, HardwareUnit, Topology};
    use crate::engine::mock::MockAccess;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn skylake_session(mock: Arc<MockAccess>) -> MonitoringSession {
        MonitoringSession::new(
            mock,
            Topology {
                arch: CpuArchitecture::Skylake,
                units: vec![HardwareUnit {
                    cpu: 0,
                    core_type: CoreType::Performance,
                }],
            },
        )
    }

    #[test]
    fn test_cha_config_programs_every_reported_box() {
        let mock = Arc::new(MockAccess::new());
        let mut session = skylake_session(mock.clone());

        let config = UncoreTableConfig { table: &SKX_CHA };
        session.activate(&config).unwrap();

        // 14 boxes on Skylake, 4 selects each
        for b in 0..14 {
            assert_eq!(mock.writes_to(0, SKYLAKE_CHA.box_ctl(b)).len(), 4);
            assert_eq!(mock.writes_to(0, SKYLAKE_CHA.counter_ctl(b, 3)).len(), 1);
        }
        // And not one box more
        assert!(mock.writes_to(0, SKYLAKE_CHA.box_ctl(14)).is_empty());
    }

    #[test]
    fn test_cha_update_differences_counters() {
        let mock = Arc::new(MockAccess::new());
        let mut session = skylake_session(mock.clone());
        let config = UncoreTableConfig { table: &SKX_CHA };
        session.activate(&config).unwrap();

        let t0 = Instant::now();

        // Counters start at zero after the box clear; first tick reads the
        // raw values
        for b in 0..14 {
            mock.set(0, SKYLAKE_CHA.counter(b, 1), 1_000);
        }
        session.update_at(&config, t0).unwrap();

        // Free-running: next sample holds the cumulative count
        for b in 0..14 {
            mock.set(0, SKYLAKE_CHA.counter(b, 1), 3_500);
        }
        let results = session
            .update_at(&config, t0 + Duration::from_secs(1))
            .unwrap();

        assert_eq!(results.unit_rows.len(), 14);
        // 2500 lookups per box, 14 boxes
        let raw: std::collections::HashMap<_, _> =
            results.overall_raw_values.into_iter().collect();
        assert_eq!(raw["llc_lookups"], 2_500.0 * 14.0);
    }

    #[test]
    fn test_arbiter_latency_row() {
        let mock = Arc::new(MockAccess::new());
        let mut session = skylake_session(mock.clone());
        session.activate(&ArbiterConfig).unwrap();

        let t0 = Instant::now();
        mock.set(0, arb::counter(0), 40_000); // occupancy
        mock.set(0, arb::counter(1), 2_000); // requests
        let results = session.update_at(&ArbiterConfig, t0).unwrap();

        assert_eq!(results.unit_rows.len(), 1);
        // 40000 / 2000 = 20 uncore clocks average
        assert_eq!(results.unit_rows[0][3], "20.0 clk");
    }
}
