//! Alder Lake / Raptor Lake monitoring configurations
//!
//! Hybrid parts: events are encoded with the extended perfevtsel layout
//! and programmed into both core types; efficiency cores simply take the
//! first six counters of a table. The branch and memory events below share
//! encodings across Golden Cove and Gracemont.

use super::{
    base_columns, bpu_raw, bpu_row, cache_raw, cache_row, format_large_number, power_raw,
    power_row, CoreEvent, CoreEventTable, CoreTableConfig, BPU_HEADERS, L3_CACHE_HEADERS,
    POWER_HEADERS,
};
use crate::engine::accumulator::CounterRecord;
use crate::session::MonitoringConfig;

pub fn configs() -> Vec<Box<dyn MonitoringConfig>> {
    vec![
        Box::new(CoreTableConfig {
            table: &BRANCH_PREDICTION,
        }),
        Box::new(CoreTableConfig { table: &LLC }),
        Box::new(CoreTableConfig {
            table: &MEMORY_OPS,
        }),
        Box::new(CoreTableConfig { table: &POWER }),
    ]
}

pub static BRANCH_PREDICTION: CoreEventTable = CoreEventTable {
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

static LLC: CoreEventTable = CoreEventTable {
    name: "L3 Cache",
    help: "Last-level cache references, hitrate, and hit bandwidth",
    headers: L3_CACHE_HEADERS,
    events: &[
        // LONGEST_LAT_CACHE.REFERENCE
        CoreEvent::new("LLCReferences", 0x2E, 0x4F),
        // LONGEST_LAT_CACHE.MISS
        CoreEvent::new("LLCMisses", 0x2E, 0x41),
    ],
    format_row: cache_row,
    overall_raw: cache_raw,
};

pub static MEMORY_OPS: CoreEventTable = CoreEventTable {
    name: "Memory Ops",
    help: "Retired load and store rates",
    headers: &[
        "Unit",
        "Active Cycles",
        "Instructions",
        "IPC",
        "Loads/s",
        "Stores/s",
        "Loads/Ki",
        "Stores/Ki",
    ],
    events: &[
        // MEM_INST_RETIRED / MEM_UOPS_RETIRED .ALL_LOADS / .ALL_STORES
        CoreEvent::new("RetiredLoads", 0xD0, 0x81),
        CoreEvent::new("RetiredStores", 0xD0, 0x82),
    ],
    format_row: memory_row,
    overall_raw: memory_raw,
};

fn memory_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let loads = r.pmc[0];
    let stores = r.pmc[1];

    let mut row = base_columns(label, r);
    row.push(format_large_number(loads));
    row.push(format_large_number(stores));
    row.push(format!(
        "{:.2}",
        super::per_kilo_instruction(loads, r.instructions)
    ));
    row.push(format!(
        "{:.2}",
        super::per_kilo_instruction(stores, r.instructions)
    ));
    row
}

fn memory_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
        ("retired_loads".to_string(), totals.pmc[0]),
        ("retired_stores".to_string(), totals.pmc[1]),
    ]
}

static POWER: CoreEventTable = CoreEventTable {
    name: "Power",
    help: "Fixed-counter activity and RAPL package/core power draw",
    headers: POWER_HEADERS,
    events: &[],
    format_row: power_row,
    overall_raw: power_raw,
};
