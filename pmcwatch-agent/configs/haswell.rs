//! Haswell / Broadwell monitoring configurations

use super::{
    bpu_raw, bpu_row, cache_raw, cache_row, ports_raw, ports_row, power_raw, power_row,
    CoreEvent, CoreEventTable, CoreTableConfig, BPU_HEADERS, L2_CACHE_HEADERS, POWER_HEADERS,
};
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
        CoreEvent::new("BAClears", 0xE6, 0x1F),
    ],
    format_row: bpu_row,
    overall_raw: bpu_raw,
};

static L2_CACHE: CoreEventTable = CoreEventTable {
    name: "L2 Cache",
    help: "L2 request rate, hitrate, and hit bandwidth",
    headers: L2_CACHE_HEADERS,
    events: &[
        // L2_RQSTS.REFERENCES
        CoreEvent::new("L2Requests", 0x24, 0xFF),
        // L2_RQSTS.MISS
        CoreEvent::new("L2Misses", 0x24, 0x3F),
    ],
    format_row: cache_row,
    overall_raw: cache_raw,
};

static PORT_UTILIZATION: CoreEventTable = CoreEventTable {
    name: "Port Utilization",
    help: "Uops executed on the ALU and branch execution ports",
    headers: &[
        "Unit",
        "Active Cycles",
        "Instructions",
        "IPC",
        "Port 0",
        "Port 1",
        "Port 5",
        "Port 6",
    ],
    events: &[
        // UOPS_EXECUTED_PORT.PORT_x
        CoreEvent::new("Port0Uops", 0xA1, 0x01),
        CoreEvent::new("Port1Uops", 0xA1, 0x02),
        CoreEvent::new("Port5Uops", 0xA1, 0x20),
        CoreEvent::new("Port6Uops", 0xA1, 0x40),
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
