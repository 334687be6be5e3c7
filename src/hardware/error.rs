//! Hardware and storage error types

use std::path::PathBuf;

/// Failures reported by a peripheral driver
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HardwareError {
    /// Peripheral did not answer a bus transaction
    #[error("{device} not responding")]
    NotResponding { device: &'static str },
    /// Peripheral answered with an error code
    #[error("{device} reported error {code}: {description}")]
    DeviceFault { device: &'static str, code: u32, description: String },
    /// Reading outside the physically possible range
    #[error("{device} returned implausible value {value}")]
    OutOfRange { device: &'static str, value: f64 },
    /// Bus in use or wedged
    #[error("bus error during {operation}")]
    Bus { operation: String },
}

impl HardwareError {
    /// Name of the peripheral involved, if known
    pub fn device(&self) -> Option<&'static str> {
        match self {
            HardwareError::NotResponding { device }
            | HardwareError::DeviceFault { device, .. }
            | HardwareError::OutOfRange { device, .. } => Some(device),
            HardwareError::Bus { .. } => None,
        }
    }
}

/// Result type for peripheral operations
pub type HardwareResult<T> = Result<T, HardwareError>;

/// The watchdog refused a feed because it already fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("watchdog already expired")]
pub struct WatchdogExpired;

/// Errors touching the on-device filesystem
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem is mounted read-only (usually because USB host owns it)
    #[error("storage is read-only, cannot write {path}")]
    ReadOnly { path: PathBuf },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io { path: path.into(), source }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            StorageError::ReadOnly { path } | StorageError::Io { path, .. } => path,
        }
    }
}
