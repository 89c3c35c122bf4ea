//! # pmcwatch-raw
//!
//! Hardware register layouts for x86 performance-counter programming.
//!
//! This crate provides type-safe abstractions over the control registers of
//! Intel performance-monitoring hardware: the per-core PMU (fixed and
//! programmable counters), the hybrid-core PMU variant introduced with
//! Alder Lake, uncore monitoring boxes (CBo/CHA cache agents, the system
//! agent arbiter), the power-control unit (PCU), and the RAPL energy meters.
//!
//! Each register family has its own bit layout, so each family gets its own
//! layout type. Adding support for a new family means adding a new layout
//! type, never editing an existing one.
//!
//! ## Usage
//!
//! ```ignore
//! use pmcwatch_raw::core::{msr, CorePerfEvtSel};
//! use pmcwatch_raw::{write_msr, RegisterLayout};
//!
//! let evtsel = CorePerfEvtSel {
//!     event_select: 0xC4, // retired branches
//!     usr: true,
//!     os: true,
//!     enable: true,
//!     ..Default::default()
//! };
//!
//! write_msr(0, msr::perfevtsel(0), evtsel.to_msr_value())?;
//! ```

pub mod core;
pub mod msr;
pub mod pcu;
pub mod rapl;
pub mod register;
pub mod uncore;

// Re-export for convenience
pub use msr::{read_msr, write_msr, MsrError, Result};
pub use register::RegisterLayout;
