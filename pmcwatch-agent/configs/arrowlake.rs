//! Arrow Lake monitoring configurations
//!
//! Event encodings carry over from Alder Lake; what changes is the counter
//! bank width, which the session picks up from the topology layout.

use super::{alderlake, power_raw, power_row, CoreEventTable, CoreTableConfig, POWER_HEADERS};
use crate::session::MonitoringConfig;

pub fn configs() -> Vec<Box<dyn MonitoringConfig>> {
    vec![
        Box::new(CoreTableConfig {
            table: &alderlake::BRANCH_PREDICTION,
        }),
        Box::new(CoreTableConfig {
            table: &alderlake::MEMORY_OPS,
        }),
        Box::new(CoreTableConfig { table: &POWER }),
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
