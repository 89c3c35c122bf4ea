pub mod affinity;
pub mod cpuid;
pub mod msr;
pub mod topology;

pub use affinity::{with_affinity, AffinityGuard};
pub use msr::{Msr, MsrHandle};
pub use topology::{CoreType, CpuArchitecture, HardwareUnit, Topology, CPU_ARCH};
