//! MSR (Model-Specific Register) read/write primitives
//!
//! This module provides one-shot MSR access through `/dev/cpu/*/msr`,
//! opening the device on every call. The monitoring agent keeps its own
//! pool of persistent handles; these helpers exist for capability probing
//! and one-off reads.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;

pub type Result<T> = std::result::Result<T, MsrError>;

/// Errors that can occur during MSR operations
#[derive(Debug, thiserror::Error)]
pub enum MsrError {
    #[error("Failed to open MSR device for CPU {cpu}: {source}")]
    OpenFailed { cpu: u32, source: std::io::Error },

    #[error("Failed to read MSR 0x{msr:X} on CPU {cpu}: {source}")]
    ReadFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to write MSR 0x{msr:X} on CPU {cpu}: {source}")]
    WriteFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to seek to MSR 0x{msr:X} on CPU {cpu}: {source}")]
    SeekFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },
}

/// Read a 64-bit value from an MSR
///
/// # Arguments
///
/// * `cpu` - logical CPU number (0-indexed)
/// * `msr` - MSR address (e.g., 0x186 for IA32_PERFEVTSEL0)
///
/// # Errors
///
/// Returns an error if:
/// - The MSR device cannot be opened (requires root/CAP_SYS_RAWIO)
/// - The MSR address is invalid
/// - The MSR is not readable
pub fn read_msr(cpu: u32, msr: u64) -> Result<u64> {
    let path = format!("/dev/cpu/{cpu}/msr");
    let mut file = File::open(&path).map_err(|e| MsrError::OpenFailed { cpu, source: e })?;

    file.seek(SeekFrom::Start(msr))
        .map_err(|e| MsrError::SeekFailed {
            cpu,
            msr,
            source: e,
        })?;

    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)
        .map_err(|e| MsrError::ReadFailed {
            cpu,
            msr,
            source: e,
        })?;

    Ok(u64::from_le_bytes(buffer))
}

/// Write a 64-bit value to an MSR
///
/// # Safety
///
/// Writing incorrect values to MSRs can cause system instability or
/// crashes. Validate register values using `RegisterLayout::validate()`
/// before writing.
///
/// # Errors
///
/// Returns an error if:
/// - The MSR device cannot be opened (requires root/CAP_SYS_RAWIO)
/// - The MSR address is invalid
/// - The MSR is read-only
pub fn write_msr(cpu: u32, msr: u64, value: u64) -> Result<()> {
    let path = format!("/dev/cpu/{cpu}/msr");
    let mut file = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_SYNC) // Ensure synchronous writes
        .open(&path)
        .map_err(|e| MsrError::OpenFailed { cpu, source: e })?;

    file.seek(SeekFrom::Start(msr))
        .map_err(|e| MsrError::SeekFailed {
            cpu,
            msr,
            source: e,
        })?;

    file.write_all(&value.to_le_bytes())
        .map_err(|e| MsrError::WriteFailed {
            cpu,
            msr,
            source: e,
        })?;

    Ok(())
}

/// Check that the MSR interface is usable at all on the given CPU
///
/// Reads the timestamp counter, which every x86 CPU exposes. Used by the
/// agent as a startup probe before any counter is programmed.
pub fn probe(cpu: u32) -> Result<()> {
    read_msr(cpu, crate::core::msr::IA32_TIME_STAMP_COUNTER).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msr_error_display() {
        let err = MsrError::OpenFailed {
            cpu: 0,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("Failed to open MSR device"));
    }
}
