//! RAPL power sampling
//!
//! The package and core-power-plane energy meters are 32-bit counters of
//! energy units; the unit size comes from a separate register read once
//! and cached. Both domains are sampled back-to-back against a single
//! stopwatch so their rates share one elapsed-time denominator.

use std::time::Instant;

use once_cell::sync::OnceCell;
use pmcwatch_raw::rapl::{msr, RaplPowerUnit, ENERGY_STATUS_WIDTH};
use pmcwatch_raw::register::RegisterLayout;

use crate::engine::reader::{compute_delta, width_mask, NormalizationState};
use crate::engine::RegisterAccess;
use crate::error::Result;

/// Watts for the two monitored power domains
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerSample {
    pub package_watts: f64,
    pub pp0_watts: f64,
}

/// Samples the RAPL energy meters of one package
pub struct PowerSampler {
    /// Any CPU of the package owning the meters
    cpu: u32,
    /// Joules per energy-counter LSB, read lazily once
    energy_scale: OnceCell<f64>,
    pkg_state: NormalizationState,
    pp0_state: NormalizationState,
}

impl PowerSampler {
    pub fn new(cpu: u32) -> Self {
        Self {
            cpu,
            energy_scale: OnceCell::new(),
            pkg_state: NormalizationState::new(),
            pp0_state: NormalizationState::new(),
        }
    }

    /// Forget previous samples (the energy-unit scale stays cached)
    pub fn reset(&mut self) {
        self.pkg_state = NormalizationState::new();
        self.pp0_state = NormalizationState::new();
    }

    fn scale(&self, access: &dyn RegisterAccess) -> Result<f64> {
        self.energy_scale
            .get_or_try_init(|| {
                let raw = access.read(self.cpu, msr::MSR_RAPL_POWER_UNIT)?;
                let unit = RaplPowerUnit::from_msr_value(raw);
                let scale = unit.energy_unit_multiplier();
                tracing::debug!(
                    "RAPL energy unit: 2^-{} J ({} J/LSB)",
                    unit.energy_units,
                    scale
                );
                Ok(scale)
            })
            .copied()
    }

    /// Read both energy meters without producing a rate.
    ///
    /// Run once at session setup so the first real sample has a sane
    /// baseline instead of energy-since-boot.
    pub fn prime(&mut self, access: &dyn RegisterAccess, now: Instant) -> Result<()> {
        self.scale(access)?;
        let mask = width_mask(ENERGY_STATUS_WIDTH);
        let pkg = access.read(self.cpu, msr::MSR_PKG_ENERGY_STATUS)? & mask;
        let pp0 = access.read(self.cpu, msr::MSR_PP0_ENERGY_STATUS)? & mask;
        self.pkg_state.advance(pkg, now);
        self.pp0_state.advance(pp0, now);
        Ok(())
    }

    /// Sample both domains and convert to watts.
    ///
    /// One stopwatch for both: the normalization factor is computed once
    /// from the package-domain timestamp and applied to both deltas, since
    /// the reads are back-to-back. Unprimed first calls use a factor of 1.
    pub fn sample(&mut self, access: &dyn RegisterAccess, now: Instant) -> Result<PowerSample> {
        let scale = self.scale(access)?;
        let mask = width_mask(ENERGY_STATUS_WIDTH);

        let pkg = access.read(self.cpu, msr::MSR_PKG_ENERGY_STATUS)? & mask;
        let pp0 = access.read(self.cpu, msr::MSR_PP0_ENERGY_STATUS)? & mask;

        let factor = self.pkg_state.factor_at(now);

        let pkg_delta = match self.pkg_state.last_sample {
            None => pkg,
            Some(_) => compute_delta(ENERGY_STATUS_WIDTH, pkg, self.pkg_state.last_raw),
        };
        let pp0_delta = match self.pp0_state.last_sample {
            None => pp0,
            Some(_) => compute_delta(ENERGY_STATUS_WIDTH, pp0, self.pp0_state.last_raw),
        };

        self.pkg_state.advance(pkg, now);
        self.pp0_state.advance(pp0, now);

        Ok(PowerSample {
            package_watts: pkg_delta as f64 * scale * factor,
            pp0_watts: pp0_delta as f64 * scale * factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockAccess;
    use std::time::Duration;

    /// units register value encoding an energy exponent of 14 (1/16384 J)
    const UNITS_14: u64 = 14 << 8;

    #[test]
    fn test_energy_scale_from_units_register() {
        let mock = MockAccess::new();
        mock.set(0, msr::MSR_RAPL_POWER_UNIT, UNITS_14);

        let sampler = PowerSampler::new(0);
        assert_eq!(sampler.scale(&mock).unwrap(), 1.0 / 16384.0);
    }

    #[test]
    fn test_watts_over_interval() {
        let mock = MockAccess::new();
        mock.set(0, msr::MSR_RAPL_POWER_UNIT, UNITS_14);
        mock.set(0, msr::MSR_PKG_ENERGY_STATUS, 1_000_000);
        mock.set(0, msr::MSR_PP0_ENERGY_STATUS, 400_000);

        let mut sampler = PowerSampler::new(0);
        let t0 = Instant::now();
        sampler.prime(&mock, t0).unwrap();

        // One second later: 163840 units * (1/16384) J = 10 J -> 10 W
        mock.set(0, msr::MSR_PKG_ENERGY_STATUS, 1_163_840);
        mock.set(0, msr::MSR_PP0_ENERGY_STATUS, 400_000 + 81_920);

        let sample = sampler
            .sample(&mock, t0 + Duration::from_secs(1))
            .unwrap();
        assert!((sample.package_watts - 10.0).abs() < 1e-9);
        assert!((sample.pp0_watts - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_both_domains_share_one_denominator() {
        let mock = MockAccess::new();
        mock.set(0, msr::MSR_RAPL_POWER_UNIT, UNITS_14);

        let mut sampler = PowerSampler::new(0);
        let t0 = Instant::now();
        sampler.prime(&mock, t0).unwrap();

        // Identical deltas over two seconds must give identical watts
        mock.set(0, msr::MSR_PKG_ENERGY_STATUS, 327_680);
        mock.set(0, msr::MSR_PP0_ENERGY_STATUS, 327_680);

        let sample = sampler
            .sample(&mock, t0 + Duration::from_secs(2))
            .unwrap();
        assert!((sample.package_watts - sample.pp0_watts).abs() < 1e-12);
        // 327680 units = 20 J over 2 s -> 10 W
        assert!((sample.package_watts - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_energy_counter_wraparound() {
        let mock = MockAccess::new();
        mock.set(0, msr::MSR_RAPL_POWER_UNIT, UNITS_14);
        mock.set(0, msr::MSR_PKG_ENERGY_STATUS, 0xFFFF_FFF0);
        mock.set(0, msr::MSR_PP0_ENERGY_STATUS, 0xFFFF_FFF0);

        let mut sampler = PowerSampler::new(0);
        let t0 = Instant::now();
        sampler.prime(&mock, t0).unwrap();

        mock.set(0, msr::MSR_PKG_ENERGY_STATUS, 0x5);
        mock.set(0, msr::MSR_PP0_ENERGY_STATUS, 0x5);

        let sample = sampler
            .sample(&mock, t0 + Duration::from_secs(1))
            .unwrap();
        // 0x15 units across the wrap, not a huge bogus delta
        let expected = 0x15 as f64 / 16384.0;
        assert!((sample.package_watts - expected).abs() < 1e-9);
    }

    #[test]
    fn test_unprimed_first_sample_uses_factor_one() {
        let mock = MockAccess::new();
        mock.set(0, msr::MSR_RAPL_POWER_UNIT, UNITS_14);
        mock.set(0, msr::MSR_PKG_ENERGY_STATUS, 16_384);

        let mut sampler = PowerSampler::new(0);
        let sample = sampler.sample(&mock, Instant::now()).unwrap();
        // No prior timestamp: raw delta scaled with factor exactly 1
        assert!((sample.package_watts - 1.0).abs() < 1e-9);
    }
}
