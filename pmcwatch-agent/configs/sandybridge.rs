//! Sandy Bridge / Ivy Bridge monitoring configurations

use super::{
    base_columns, bpu_raw, bpu_row, format_bandwidth, format_percent, per_kilo_instruction,
    ports_raw, ports_row, power_raw, power_row, CoreEvent, CoreEventTable, CoreTableConfig,
    BPU_HEADERS, POWER_HEADERS,
};
use crate::engine::accumulator::CounterRecord;
use crate::session::MonitoringConfig;

pub fn configs() -> Vec<Box<dyn MonitoringConfig>> {
    vec![
        Box::new(CoreTableConfig {
            table: &BRANCH_PREDICTION,
        }),
        Box::new(CoreTableConfig { table: &L2_CACHE }),
        Box::new(CoreTableConfig {
            table: &PORT_UTILIZATION,
        }),
        Box::new(CoreTableConfig { table: &POWER }),
    ]
}

static BRANCH_PREDICTION: CoreEventTable = CoreEventTable {
    name: "Branch Prediction",
    help: "Retired and mispredicted branches, BPU accuracy, frontend resteers",
    headers: BPU_HEADERS,
    events: &[
        // BR_INST_RETIRED.ALL_BRANCHES
        CoreEvent::new("RetiredBranches", 0xC4, 0x00),
        // BR_MISP_RETIRED.ALL_BRANCHES
        CoreEvent::new("MispredictedBranches", 0xC5, 0x00),
        // BACLEARS.ANY
        CoreEvent::new("BAClears", 0xE6, 0x01),
    ],
    format_row: bpu_row,
    overall_raw: bpu_raw,
};

// Sandy Bridge's L2 event only splits by request type, so hitrate is
// computed from the demand data and code read pairs.
static L2_CACHE: CoreEventTable = CoreEventTable {
    name: "L2 Cache",
    help: "L2 demand hitrate and hit bandwidth",
    headers: &[
        "Unit",
        "Active Cycles",
        "Instructions",
        "IPC",
        "L2 Hitrate",
        "L2 Hit BW",
        "L2 MPKI",
    ],
    events: &[
        // L2_RQSTS.DEMAND_DATA_RD_HIT
        CoreEvent::new("DataReadHits", 0x24, 0x01),
        // L2_RQSTS.ALL_DEMAND_DATA_RD
        CoreEvent::new("DataReads", 0x24, 0x03),
        // L2_RQSTS.CODE_RD_HIT
        CoreEvent::new("CodeReadHits", 0x24, 0x10),
        // L2_RQSTS.ALL_CODE_RD
        CoreEvent::new("CodeReads", 0x24, 0x30),
    ],
    format_row: snb_l2_row,
    overall_raw: snb_l2_raw,
};

fn snb_l2_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let hits = r.pmc[0] + r.pmc[2];
    let requests = r.pmc[1] + r.pmc[3];
    let misses = requests - hits;

    let mut row = base_columns(label, r);
    row.push(format_percent(hits / requests * 100.0));
    row.push(format_bandwidth(hits));
    row.push(format!(
        "{:.2}",
        per_kilo_instruction(misses, r.instructions)
    ));
    row
}

fn snb_l2_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
        ("l2_data_read_hits".to_string(), totals.pmc[0]),
        ("l2_data_reads".to_string(), totals.pmc[1]),
        ("l2_code_read_hits".to_string(), totals.pmc[2]),
        ("l2_code_reads".to_string(), totals.pmc[3]),
    ]
}

static PORT_UTILIZATION: CoreEventTable = CoreEventTable {
    name: "Port Utilization",
    help: "Uops dispatched to the ALU and store execution ports",
    headers: &[
        "Unit",
        "Active Cycles",
        "Instructions",
        "IPC",
        "Port 0",
        "Port 1",
        "Port 4",
        "Port 5",
    ],
    events: &[
        // UOPS_DISPATCHED_PORT.PORT_x
        CoreEvent::new("Port0Uops", 0xA1, 0x01),
        CoreEvent::new("Port1Uops", 0xA1, 0x02),
        CoreEvent::new("Port4Uops", 0xA1, 0x40),
        CoreEvent::new("Port5Uops", 0xA1, 0x80),
    ],
    format_row: ports_row,
    overall_raw: ports_raw,
};

static POWER: CoreEventTable = CoreEventTable {
    name: "Power",
    help: "Fixed-counter activity and RAPL package/core power draw",
    headers: POWER_HEADERS,
    events: &[],
    format_row: power_row,
    overall_raw: power_raw,
};
