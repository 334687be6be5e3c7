//! Plain-text trip log
//!
//! One `TripNNNNN.csv` per session under `readings/`, opened on the first
//! committed leg. Numbering continues one past the highest file present.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::api::formatting::TripFormatter;
use crate::core::Leg;
use crate::hardware::{Storage, StorageError};

#[derive(Debug, Default)]
pub struct TripLog {
    file: Option<(PathBuf, BufWriter<File>)>,
}

/// Parse `TripNNNNN.csv` into its number
fn trip_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("Trip")?.strip_suffix(".csv")?;
    if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Path the next trip file would take inside `dir`
pub fn next_trip_path(dir: &Path) -> PathBuf {
    let highest = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| entry.file_name().to_str().and_then(trip_number))
        .max()
        .unwrap_or(0);
    dir.join(format!("Trip{:05}.csv", highest + 1))
}

impl TripLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// File in use, once one has been opened
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    fn open(&mut self, storage: &Storage, formatter: &TripFormatter) -> Result<(), StorageError> {
        if self.file.is_some() {
            return Ok(());
        }
        let dir = storage.readings_dir();
        storage.ensure_writable(&dir)?;
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        let path = next_trip_path(&dir);
        let file = File::create(&path).map_err(|e| StorageError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", formatter.header()).map_err(|e| StorageError::io(&path, e))?;
        info!("Trip log {}", path.display());
        self.file = Some((path, writer));
        Ok(())
    }

    pub fn append(&mut self, storage: &Storage, formatter: &TripFormatter, leg: &Leg) -> Result<(), StorageError> {
        self.open(storage, formatter)?;
        let row = formatter.format_row(leg);
        if let Some((path, writer)) = self.file.as_mut() {
            writeln!(writer, "{}", row).map_err(|e| StorageError::io(path.as_path(), e))?;
            debug!("Trip row: {}", row);
        }
        Ok(())
    }

    /// Push buffered rows to disk; a log that was never opened stays unopened
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if let Some((path, writer)) = self.file.as_mut() {
            writer.flush().map_err(|e| StorageError::io(path.as_path(), e))?;
        }
        Ok(())
    }
}
