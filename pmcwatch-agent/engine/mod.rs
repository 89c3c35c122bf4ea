//! The counter engine: programming, reading, normalization, aggregation
//!
//! Everything here talks to hardware through the [`RegisterAccess`] trait,
//! so the whole engine runs unchanged against the recording mock used in
//! tests.

pub mod accumulator;
pub mod power;
pub mod programmer;
pub mod reader;

use std::sync::Arc;

use crate::common::affinity::with_affinity;
use crate::common::{cpuid, msr};
use crate::error::Result;

/// Register and CPUID access for one machine
///
/// Implementations own the affinity discipline: a call for CPU `n` must
/// observe CPU `n`'s registers and nothing else's. The engine never pins
/// threads itself.
pub trait RegisterAccess: Send + Sync {
    /// Read a 64-bit model-specific register on the given CPU
    fn read(&self, cpu: u32, addr: u64) -> Result<u64>;

    /// Write a 64-bit model-specific register on the given CPU
    fn write(&self, cpu: u32, addr: u64, value: u64) -> Result<()>;

    /// Execute CPUID on the given CPU
    fn cpuid_on(&self, cpu: u32, leaf: u32, subleaf: u32) -> Result<(u32, u32, u32, u32)>;
}

/// Production implementation backed by pooled `/dev/cpu/N/msr` handles
pub struct MsrRegisterAccess;

impl MsrRegisterAccess {
    pub fn shared() -> Arc<dyn RegisterAccess> {
        Arc::new(Self)
    }
}

impl RegisterAccess for MsrRegisterAccess {
    fn read(&self, cpu: u32, addr: u64) -> Result<u64> {
        msr::read_msr(cpu, addr)
    }

    fn write(&self, cpu: u32, addr: u64, value: u64) -> Result<()> {
        msr::write_msr(cpu, addr, value)
    }

    fn cpuid_on(&self, cpu: u32, leaf: u32, subleaf: u32) -> Result<(u32, u32, u32, u32)> {
        with_affinity(cpu, || cpuid::cpuid(leaf, subleaf))
    }
}

#[cfg(test)]
pub mod mock {
    //! A register file in a `HashMap`, with an operation log for asserting
    //! programming sequences.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockOp {
        Read { cpu: u32, addr: u64 },
        Write { cpu: u32, addr: u64, value: u64 },
    }

    #[derive(Default)]
    pub struct MockAccess {
        regs: Mutex<HashMap<(u32, u64), u64>>,
        log: Mutex<Vec<MockOp>>,
    }

    impl MockAccess {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a register value without logging
        pub fn set(&self, cpu: u32, addr: u64, value: u64) {
            self.regs.lock().insert((cpu, addr), value);
        }

        /// Current value of a register (0 if never written)
        pub fn get(&self, cpu: u32, addr: u64) -> u64 {
            self.regs.lock().get(&(cpu, addr)).copied().unwrap_or(0)
        }

        pub fn ops(&self) -> Vec<MockOp> {
            self.log.lock().clone()
        }

        pub fn writes_to(&self, cpu: u32, addr: u64) -> Vec<u64> {
            self.log
                .lock()
                .iter()
                .filter_map(|op| match op {
                    MockOp::Write {
                        cpu: c,
                        addr: a,
                        value,
                    } if *c == cpu && *a == addr => Some(*value),
                    _ => None,
                })
                .collect()
        }

        pub fn clear_log(&self) {
            self.log.lock().clear();
        }
    }

    impl RegisterAccess for MockAccess {
        fn read(&self, cpu: u32, addr: u64) -> Result<u64> {
            self.log.lock().push(MockOp::Read { cpu, addr });
            Ok(self.get(cpu, addr))
        }

        fn write(&self, cpu: u32, addr: u64, value: u64) -> Result<()> {
            self.log.lock().push(MockOp::Write { cpu, addr, value });
            self.regs.lock().insert((cpu, addr), value);
            Ok(())
        }

        fn cpuid_on(&self, _cpu: u32, _leaf: u32, _subleaf: u32) -> Result<(u32, u32, u32, u32)> {
            Ok((0, 0, 0, 0))
        }
    }
}
