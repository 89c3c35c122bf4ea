//! Goldmont Plus (Gemini Lake) monitoring configurations
//!
//! The Atom line has four programmable counters and its own frontend
//! events; cache metrics come from the architectural LLC events.

use super::{
    base_columns, bpu_raw, bpu_row, cache_raw, cache_row, format_percent, power_raw, power_row,
    CoreEvent, CoreEventTable, CoreTableConfig, BPU_HEADERS, L3_CACHE_HEADERS, POWER_HEADERS,
};
use crate::engine::accumulator::CounterRecord;
use crate::session::MonitoringConfig;

pub fn configs() -> Vec<Box<dyn MonitoringConfig>> {
    vec![
        Box::new(CoreTableConfig {
            table: &BRANCH_PREDICTION,
        }),
        Box::new(CoreTableConfig {
            table: &INSTRUCTION_CACHE,
        }),
        Box::new(CoreTableConfig { table: &LLC }),
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
        // BACLEARS.ALL
        CoreEvent::new("BAClears", 0xE6, 0x01),
    ],
    format_row: bpu_row,
    overall_raw: bpu_raw,
};

static INSTRUCTION_CACHE: CoreEventTable = CoreEventTable {
    name: "Instruction Cache",
    help: "Instruction cache accesses and hitrate",
    headers: &[
        "Unit",
        "Active Cycles",
        "Instructions",
        "IPC",
        "IC Hitrate",
        "IC Access/Ki",
    ],
    events: &[
        // ICACHE.ACCESSES
        CoreEvent::new("ICacheAccesses", 0x80, 0x03),
        // ICACHE.MISSES
        CoreEvent::new("ICacheMisses", 0x80, 0x02),
    ],
    format_row: icache_row,
    overall_raw: icache_raw,
};

fn icache_row(label: &str, r: &CounterRecord) -> Vec<String> {
    let accesses = r.pmc[0];
    let misses = r.pmc[1];

    let mut row = base_columns(label, r);
    row.push(format_percent((1.0 - misses / accesses) * 100.0));
    row.push(format!(
        "{:.2}",
        super::per_kilo_instruction(accesses, r.instructions)
    ));
    row
}

fn icache_raw(totals: &CounterRecord) -> Vec<(String, f64)> {
    vec![
        ("instructions".to_string(), totals.instructions),
        ("active_cycles".to_string(), totals.active_cycles),
        ("icache_accesses".to_string(), totals.pmc[0]),
        ("icache_misses".to_string(), totals.pmc[1]),
    ]
}

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

static POWER: CoreEventTable = CoreEventTable {
    name: "Power",
    help: "Fixed-counter activity and RAPL package/core power draw",
    headers: POWER_HEADERS,
    events: &[],
    format_row: power_row,
    overall_raw: power_raw,
};
