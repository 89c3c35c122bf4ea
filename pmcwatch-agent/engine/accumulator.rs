//! Per-unit counter records and the running totals

use serde::Serialize;

/// Time-normalized counter rates for one hardware unit (or the totals
/// across all of them)
///
/// Counter fields hold per-second rates after the first tick (the first
/// tick holds per-interval values; see the reader module). Power fields
/// are package-global measurements and are only meaningful on the totals
/// record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CounterRecord {
    /// Unhalted core cycles per second
    pub active_cycles: f64,

    /// Retired instructions per second
    pub instructions: f64,

    /// Reference (TSC-rate) cycles per second
    pub ref_cycles: f64,

    /// Programmable-counter rates, in programming order
    pub pmc: Vec<f64>,

    /// Package power draw in watts
    pub package_watts: f64,

    /// Core power-plane power draw in watts
    pub pp0_watts: f64,
}

impl CounterRecord {
    /// A zeroed record with room for `slots` programmable counters
    pub fn with_slots(slots: usize) -> Self {
        Self {
            pmc: vec![0.0; slots],
            ..Default::default()
        }
    }

    /// Instructions per cycle; NaN when no cycles were observed
    pub fn ipc(&self) -> f64 {
        self.instructions / self.active_cycles
    }
}

/// Zero the totals at the start of a tick
pub fn reset_totals(totals: &mut CounterRecord) {
    totals.active_cycles = 0.0;
    totals.instructions = 0.0;
    totals.ref_cycles = 0.0;
    for v in totals.pmc.iter_mut() {
        *v = 0.0;
    }
    // Power fields are overwritten by the power sampler, not accumulated;
    // leave them to its writer.
}

/// Fold one unit's record into the totals.
///
/// Plain field-wise addition: commutative and associative, so the totals
/// are identical whatever order the units are visited in. Power fields are
/// deliberately not touched.
pub fn fold_into(totals: &mut CounterRecord, unit: &CounterRecord) {
    totals.active_cycles += unit.active_cycles;
    totals.instructions += unit.instructions;
    totals.ref_cycles += unit.ref_cycles;

    if totals.pmc.len() < unit.pmc.len() {
        totals.pmc.resize(unit.pmc.len(), 0.0);
    }
    for (acc, v) in totals.pmc.iter_mut().zip(unit.pmc.iter()) {
        *acc += *v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<CounterRecord> {
        (0..6)
            .map(|i| {
                let base = (i as f64 + 1.0) * 1.5e8;
                CounterRecord {
                    active_cycles: base,
                    instructions: base * 1.3,
                    ref_cycles: base * 0.9,
                    pmc: vec![base * 0.01, base * 0.002, base * 0.7, base * 0.0004],
                    package_watts: 0.0,
                    pp0_watts: 0.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_fold_order_independence() {
        let records = sample_records();

        let mut forward = CounterRecord::with_slots(4);
        reset_totals(&mut forward);
        for r in &records {
            fold_into(&mut forward, r);
        }

        let mut reverse = CounterRecord::with_slots(4);
        reset_totals(&mut reverse);
        for r in records.iter().rev() {
            fold_into(&mut reverse, r);
        }

        // Interleaved: evens then odds
        let mut shuffled = CounterRecord::with_slots(4);
        reset_totals(&mut shuffled);
        for r in records.iter().step_by(2) {
            fold_into(&mut shuffled, r);
        }
        for r in records.iter().skip(1).step_by(2) {
            fold_into(&mut shuffled, r);
        }

        for other in [&reverse, &shuffled] {
            assert!((forward.active_cycles - other.active_cycles).abs() < 1e-6);
            assert!((forward.instructions - other.instructions).abs() < 1e-6);
            assert!((forward.ref_cycles - other.ref_cycles).abs() < 1e-6);
            for (a, b) in forward.pmc.iter().zip(other.pmc.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_reset_zeroes_counters_but_not_power() {
        let mut totals = CounterRecord {
            active_cycles: 1.0,
            instructions: 2.0,
            ref_cycles: 3.0,
            pmc: vec![4.0, 5.0],
            package_watts: 42.0,
            pp0_watts: 17.0,
        };
        reset_totals(&mut totals);

        assert_eq!(totals.active_cycles, 0.0);
        assert_eq!(totals.instructions, 0.0);
        assert_eq!(totals.pmc, vec![0.0, 0.0]);
        // Power is a global measurement with its own writer
        assert_eq!(totals.package_watts, 42.0);
    }

    #[test]
    fn test_fold_widens_pmc_bank() {
        // Hybrid sessions mix 6-counter and 8-counter units
        let mut totals = CounterRecord::with_slots(0);
        let narrow = CounterRecord {
            pmc: vec![1.0; 6],
            ..Default::default()
        };
        let wide = CounterRecord {
            pmc: vec![1.0; 8],
            ..Default::default()
        };
        fold_into(&mut totals, &narrow);
        fold_into(&mut totals, &wide);

        assert_eq!(totals.pmc.len(), 8);
        assert_eq!(totals.pmc[0], 2.0);
        assert_eq!(totals.pmc[7], 1.0);
    }

    #[test]
    fn test_ipc_division_by_zero_is_nan_not_panic() {
        let record = CounterRecord::default();
        assert!(record.ipc().is_nan());
    }
}
