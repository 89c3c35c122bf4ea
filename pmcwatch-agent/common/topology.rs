// CPU architecture detection, core-type classification, and PMU layout

use once_cell::sync::Lazy;

use crate::common::affinity::with_affinity;
use crate::common::cpuid;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArchitecture {
    SandyBridge,
    Haswell,
    Skylake,
    GoldmontPlus,
    AlderLake,
    ArrowLake,
    Unknown,
}

impl CpuArchitecture {
    pub fn name(&self) -> &'static str {
        match self {
            CpuArchitecture::SandyBridge => "Sandy Bridge",
            CpuArchitecture::Haswell => "Haswell",
            CpuArchitecture::Skylake => "Skylake",
            CpuArchitecture::GoldmontPlus => "Goldmont Plus",
            CpuArchitecture::AlderLake => "Alder Lake",
            CpuArchitecture::ArrowLake => "Arrow Lake",
            CpuArchitecture::Unknown => "Unknown",
        }
    }

    /// Whether the part mixes performance and efficiency cores with
    /// distinct register layouts
    pub fn is_hybrid(&self) -> bool {
        matches!(
            self,
            CpuArchitecture::AlderLake | CpuArchitecture::ArrowLake
        )
    }

    /// Number of cache-agent boxes (CBo/CHA) the family can expose, if it
    /// has a monitored uncore at all. Hardware may report fewer.
    pub fn cache_box_count(&self) -> Option<usize> {
        match self {
            CpuArchitecture::SandyBridge => Some(8),
            CpuArchitecture::Skylake => Some(14),
            _ => None,
        }
    }

    /// PMU register layout for a core of the given type on this family
    pub fn layout_for(&self, core_type: CoreType) -> PmuLayout {
        match (self, core_type) {
            (CpuArchitecture::AlderLake, CoreType::Performance) => PmuLayout {
                programmable_counters: 8,
                fixed_counters: 3,
                counter_width: 48,
            },
            (CpuArchitecture::AlderLake, CoreType::Efficiency) => PmuLayout {
                programmable_counters: 6,
                fixed_counters: 3,
                counter_width: 48,
            },
            (CpuArchitecture::ArrowLake, _) => PmuLayout {
                programmable_counters: 8,
                fixed_counters: 3,
                counter_width: 48,
            },
            _ => PmuLayout {
                programmable_counters: 4,
                fixed_counters: 3,
                counter_width: 48,
            },
        }
    }
}

/// Hybrid core-type tag; pre-hybrid parts are all `Performance`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreType {
    Performance,
    Efficiency,
}

impl CoreType {
    pub fn name(&self) -> &'static str {
        match self {
            CoreType::Performance => "P",
            CoreType::Efficiency => "E",
        }
    }
}

/// Per-core-type PMU register layout
#[derive(Debug, Clone, Copy)]
pub struct PmuLayout {
    pub programmable_counters: usize,
    pub fixed_counters: usize,
    pub counter_width: u32,
}

/// One addressable monitoring target: a logical CPU plus its core type
#[derive(Debug, Clone, Copy)]
pub struct HardwareUnit {
    pub cpu: u32,
    pub core_type: CoreType,
}

impl HardwareUnit {
    pub fn label(&self, hybrid: bool) -> String {
        if hybrid {
            format!("cpu{} ({})", self.cpu, self.core_type.name())
        } else {
            format!("cpu{}", self.cpu)
        }
    }
}

/// The set of units a monitoring session operates on
#[derive(Debug, Clone)]
pub struct Topology {
    pub arch: CpuArchitecture,
    pub units: Vec<HardwareUnit>,
}

impl Topology {
    /// Classify each monitored CPU once, at startup.
    ///
    /// The core-type query must execute on the CPU being classified, so
    /// each probe runs under an affinity pin. A misclassified CPU would
    /// silently be programmed with the wrong register layout, which is why
    /// this happens here and never again per tick.
    pub fn probe(arch: CpuArchitecture, cpus: &[i32]) -> Result<Self> {
        let mut units = Vec::with_capacity(cpus.len());
        for &cpu in cpus {
            let cpu = cpu as u32;
            let core_type = if arch.is_hybrid() {
                classify_core(cpu)?
            } else {
                CoreType::Performance
            };
            units.push(HardwareUnit { cpu, core_type });
        }

        if arch.is_hybrid() {
            let e_count = units
                .iter()
                .filter(|u| u.core_type == CoreType::Efficiency)
                .count();
            tracing::info!(
                "Classified {} CPUs: {} performance, {} efficiency",
                units.len(),
                units.len() - e_count,
                e_count
            );
        }

        Ok(Self { arch, units })
    }

    /// Widest programmable-counter bank across the monitored units
    pub fn max_programmable_counters(&self) -> usize {
        self.units
            .iter()
            .map(|u| self.arch.layout_for(u.core_type).programmable_counters)
            .max()
            .unwrap_or(0)
    }
}

fn classify_core(cpu: u32) -> Result<CoreType> {
    let (eax, _, _, _) = with_affinity(cpu, || cpuid::cpuid(cpuid::HYBRID_INFO_LEAF, 0))?;
    let tag = (eax >> 24) & 0xFF;
    Ok(match tag {
        cpuid::CORE_TYPE_EFFICIENCY => CoreType::Efficiency,
        cpuid::CORE_TYPE_PERFORMANCE => CoreType::Performance,
        other => {
            // Unknown tags get the performance-core layout rather than
            // failing the whole session.
            tracing::warn!(
                "CPU {cpu} reported unknown core-type tag 0x{other:02X}, treating as performance"
            );
            CoreType::Performance
        }
    })
}

pub static CPU_ARCH: Lazy<CpuArchitecture> = Lazy::new(detect_architecture);

fn detect_architecture() -> CpuArchitecture {
    // CPUID leaf 1: family, model, stepping
    let (eax, _ebx, _ecx, _edx) = cpuid::cpuid(1, 0);

    let stepping = eax & 0xF;
    let model = (eax >> 4) & 0xF;
    let family = (eax >> 8) & 0xF;
    let extended_model = (eax >> 16) & 0xF;
    let extended_family = (eax >> 20) & 0xFF;

    let display_family = if family == 0xF {
        family + extended_family
    } else {
        family
    };

    let display_model = if family == 0x6 || family == 0xF {
        (extended_model << 4) + model
    } else {
        model
    };

    tracing::info!(
        "CPU: Family {:X}, Model {:X}, Stepping {:X}",
        display_family,
        display_model,
        stepping
    );

    if display_family != 0x6 {
        tracing::warn!("Non-Intel or very old Intel CPU detected");
        return CpuArchitecture::Unknown;
    }

    // Reference: Intel® 64 and IA-32 Architectures Software Developer's
    // Manual, CPUID model tables
    let arch = match display_model {
        // Sandy Bridge (client and E5 server)
        0x2A | 0x2D => CpuArchitecture::SandyBridge,

        // Ivy Bridge counts the same events at the same offsets
        0x3A | 0x3E => CpuArchitecture::SandyBridge,

        // Haswell / Broadwell
        0x3C | 0x45 | 0x46 | 0x3F | 0x3D | 0x47 | 0x4F | 0x56 => CpuArchitecture::Haswell,

        // Skylake through Comet Lake client, plus Skylake-SP
        0x4E | 0x5E | 0x55 | 0x8E | 0x9E | 0xA5 | 0xA6 => CpuArchitecture::Skylake,

        // Goldmont Plus (Gemini Lake)
        0x7A => CpuArchitecture::GoldmontPlus,

        // Alder Lake / Raptor Lake
        0x97 | 0x9A | 0xB7 | 0xBA | 0xBF => CpuArchitecture::AlderLake,

        // Arrow Lake
        0xC5 | 0xC6 => CpuArchitecture::ArrowLake,

        _ => {
            tracing::warn!("Unknown Intel CPU model: {:X}", display_model);
            if display_model >= 0x97 && cpuid::hybrid_flag() {
                tracing::info!("Defaulting to Alder Lake for unknown hybrid part");
                CpuArchitecture::AlderLake
            } else if display_model >= 0x4E {
                tracing::info!("Defaulting to Skylake architecture for compatibility");
                CpuArchitecture::Skylake
            } else {
                CpuArchitecture::Unknown
            }
        }
    };

    tracing::info!("Detected CPU architecture: {}", arch.name());

    arch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        let skl = CpuArchitecture::Skylake;
        assert_eq!(skl.layout_for(CoreType::Performance).programmable_counters, 4);
        assert_eq!(skl.cache_box_count(), Some(14));

        let adl = CpuArchitecture::AlderLake;
        assert!(adl.is_hybrid());
        assert_eq!(adl.layout_for(CoreType::Performance).programmable_counters, 8);
        assert_eq!(adl.layout_for(CoreType::Efficiency).programmable_counters, 6);
    }

    #[test]
    fn test_unit_labels() {
        let unit = HardwareUnit {
            cpu: 3,
            core_type: CoreType::Efficiency,
        };
        assert_eq!(unit.label(true), "cpu3 (E)");
        assert_eq!(unit.label(false), "cpu3");
    }

    #[test]
    fn test_max_programmable_counters_mixed() {
        let topo = Topology {
            arch: CpuArchitecture::AlderLake,
            units: vec![
                HardwareUnit {
                    cpu: 0,
                    core_type: CoreType::Performance,
                },
                HardwareUnit {
                    cpu: 8,
                    core_type: CoreType::Efficiency,
                },
            ],
        };
        assert_eq!(topo.max_programmable_counters(), 8);
    }
}
