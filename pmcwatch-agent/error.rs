use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PmcError {
    #[error("MSR operation failed: {0}")]
    Msr(String),

    #[error("Affinity operation failed: {0}")]
    Affinity(String),

    #[error("Topology detection failed: {0}")]
    Topology(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Nix error: {0}")]
    Nix(#[from] nix::Error),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("MSR device error: {0}")]
    MsrDevice(#[from] pmcwatch_raw::MsrError),
}

pub type Result<T> = std::result::Result<T, PmcError>;
