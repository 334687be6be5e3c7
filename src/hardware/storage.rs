//! On-device filesystem layout

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};

use super::error::StorageError;

const CONFIG_FILE: &str = "config.json";
const CALIBRATION_DATA_FILE: &str = "calibration_data.json";
const DIAGNOSTIC_FILE: &str = "error.log";
const READINGS_DIR: &str = "readings";

/// Root of the persisted files.
///
/// The filesystem is read-only whenever a USB host has it mounted; every
/// write goes through [`Storage::ensure_writable`] first.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    read_only: bool,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), read_only: false }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn calibration_data_path(&self) -> PathBuf {
        self.root.join(CALIBRATION_DATA_FILE)
    }

    pub fn diagnostic_path(&self) -> PathBuf {
        self.root.join(DIAGNOSTIC_FILE)
    }

    pub fn readings_dir(&self) -> PathBuf {
        self.root.join(READINGS_DIR)
    }

    pub fn ensure_writable(&self, path: &Path) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly { path: path.to_path_buf() });
        }
        Ok(())
    }

    /// Replace `path` with `contents`
    pub fn write(&self, path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        self.ensure_writable(path)?;
        fs::write(path, contents).map_err(|e| StorageError::io(path, e))
    }

    /// Persist a fault report, falling back to the console log
    pub fn write_diagnostic(&self, report: &str) -> bool {
        let path = self.diagnostic_path();
        match self.write(&path, report.as_bytes()) {
            Ok(()) => {
                info!("Fault report written to {}", path.display());
                true
            }
            Err(e) => {
                error!("Could not persist fault report ({}):\n{}", e, report);
                false
            }
        }
    }
}
