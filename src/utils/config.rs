//! Persisted device settings
//!
//! [`Config`] is the flat document stored in `config.json`. Tasks never
//! write it directly: they go through the setters on [`ConfigStore`], which
//! validate the value and mark the store dirty. The supervisor writes a
//! dirty store back once, during shutdown.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::api::formatting::{AngleUnit, DistanceUnit};
use crate::calibration::CalibrationModel;
use crate::hardware::{Storage, StorageError};
use crate::utils::axes::AxisMap;
use crate::validation::StrictnessLevel;

/// System-wide configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inactivity timeout (seconds)
    pub timeout: u64,
    pub units: DistanceUnit,
    pub angles: AngleUnit,
    /// Added to every raw laser distance (metres)
    #[serde(rename = "laser_cal")]
    pub laser_offset: f64,
    pub anomaly_strictness: StrictnessLevel,
    /// Accepted calibration, if any
    #[serde(rename = "calib")]
    pub calibration: Option<CalibrationModel>,
    /// Countdown before a button-triggered shot (seconds)
    #[serde(rename = "timer")]
    pub shot_timer: u64,
    /// Append committed legs to a trip log
    pub save_readings: bool,
    pub mag_axes: AxisMap,
    pub grav_axes: AxisMap,
    /// Gravity component along the screen axis that flips the display
    pub flip_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: 120,
            units: DistanceUnit::Metric,
            angles: AngleUnit::Degrees,
            laser_offset: 0.0,
            anomaly_strictness: StrictnessLevel::Relaxed,
            calibration: None,
            shot_timer: 0,
            save_readings: false,
            mag_axes: AxisMap::IDENTITY,
            grav_axes: AxisMap::IDENTITY,
            flip_threshold: 0.5,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {parameter} '{value}': {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
    #[error("{message}")]
    IoError { message: String },
    #[error("{message}")]
    SerializationError { message: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn out_of_range(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Owner of the live [`Config`] and its dirty flag
#[derive(Debug, Default)]
pub struct ConfigStore {
    config: Config,
    is_modified: bool,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self { config, is_modified: false }
    }

    /// Load `config.json`; a missing or unreadable file yields the defaults
    pub fn load(storage: &Storage) -> Self {
        match Self::try_load(&storage.config_path()) {
            Ok(store) => {
                info!("Loaded configuration from {}", storage.config_path().display());
                store
            }
            Err(e) => {
                warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let path_str = path.to_string_lossy();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse config file '{}': {}", path_str, e),
        })?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.is_modified
    }

    /// Write the configuration back if any setter changed it.
    ///
    /// Returns whether a write happened.
    pub fn save_if_dirty(&mut self, storage: &Storage) -> Result<bool, ConfigError> {
        if !self.is_modified {
            return Ok(false);
        }
        let content = serde_json::to_string_pretty(&self.config).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize config: {}", e),
        })?;
        storage.write(&storage.config_path(), content.as_bytes())?;
        self.is_modified = false;
        info!("Configuration saved");
        Ok(true)
    }

    fn mark<T>(&mut self, old: T) -> T {
        self.is_modified = true;
        old
    }

    pub fn set_timeout(&mut self, seconds: u64) -> Result<u64, ConfigError> {
        if !(10..=3600).contains(&seconds) {
            return Err(out_of_range("timeout", seconds, "must be between 10 and 3600 seconds"));
        }
        let old = std::mem::replace(&mut self.config.timeout, seconds);
        Ok(self.mark(old))
    }

    pub fn set_units(&mut self, units: DistanceUnit) -> DistanceUnit {
        let old = std::mem::replace(&mut self.config.units, units);
        self.mark(old)
    }

    pub fn set_angles(&mut self, angles: AngleUnit) -> AngleUnit {
        let old = std::mem::replace(&mut self.config.angles, angles);
        self.mark(old)
    }

    pub fn set_laser_offset(&mut self, metres: f64) -> Result<f64, ConfigError> {
        if !metres.is_finite() || !(-1.0..=1.0).contains(&metres) {
            return Err(out_of_range("laser_cal", metres, "offset must be within one metre"));
        }
        let old = std::mem::replace(&mut self.config.laser_offset, metres);
        Ok(self.mark(old))
    }

    pub fn set_anomaly_strictness(&mut self, level: StrictnessLevel) -> StrictnessLevel {
        let old = std::mem::replace(&mut self.config.anomaly_strictness, level);
        self.mark(old)
    }

    /// Replace the whole calibration model at once
    pub fn set_calibration(&mut self, model: CalibrationModel) -> Option<CalibrationModel> {
        let old = self.config.calibration.replace(model);
        self.mark(old)
    }

    pub fn set_shot_timer(&mut self, seconds: u64) -> Result<u64, ConfigError> {
        if seconds > 30 {
            return Err(out_of_range("timer", seconds, "shot timer is at most 30 seconds"));
        }
        let old = std::mem::replace(&mut self.config.shot_timer, seconds);
        Ok(self.mark(old))
    }

    pub fn set_save_readings(&mut self, enabled: bool) -> bool {
        let old = std::mem::replace(&mut self.config.save_readings, enabled);
        self.mark(old)
    }

    pub fn set_flip_threshold(&mut self, threshold: f64) -> Result<f64, ConfigError> {
        if !threshold.is_finite() || !(0.05..=0.95).contains(&threshold) {
            return Err(out_of_range("flip_threshold", threshold, "must be between 0.05 and 0.95"));
        }
        let old = std::mem::replace(&mut self.config.flip_threshold, threshold);
        Ok(self.mark(old))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(&Storage::new(dir.path()));
        assert_eq!(store.config(), &Config::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        fs::write(storage.config_path(), "{ not json").unwrap();
        let store = ConfigStore::load(&storage);
        assert_eq!(store.config().timeout, 120);

        assert!(matches!(
            ConfigStore::try_load(&storage.config_path()),
            Err(ConfigError::SerializationError { .. })
        ));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        fs::write(
            storage.config_path(),
            r#"{"timeout": 300, "units": "imperial", "mag_axes": "-Y-X+Z", "unknown": 1}"#,
        )
        .unwrap();
        let config = ConfigStore::load(&storage).config().clone();
        assert_eq!(config.timeout, 300);
        assert_eq!(config.units, DistanceUnit::Imperial);
        assert_eq!(config.mag_axes.to_string(), "-Y-X+Z");
        assert_eq!(config.angles, AngleUnit::Degrees);
        assert_eq!(config.anomaly_strictness, StrictnessLevel::Relaxed);
    }

    #[test]
    fn test_setters_validate_and_return_old_value() {
        let mut store = ConfigStore::default();
        assert_eq!(store.set_timeout(600).unwrap(), 120);
        assert!(store.is_dirty());
        assert!(matches!(store.set_timeout(5), Err(ConfigError::InvalidParameter { .. })));
        assert_eq!(store.config().timeout, 600);

        assert!(store.set_laser_offset(1.5).is_err());
        assert!(store.set_laser_offset(f64::NAN).is_err());
        assert_eq!(store.set_laser_offset(0.12).unwrap(), 0.0);
        assert!(store.set_shot_timer(31).is_err());
        assert!(store.set_flip_threshold(0.99).is_err());
        assert_eq!(store.set_units(DistanceUnit::Imperial), DistanceUnit::Metric);
    }

    #[test]
    fn test_save_only_when_dirty() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let mut store = ConfigStore::load(&storage);
        assert!(!store.save_if_dirty(&storage).unwrap());
        assert!(!storage.config_path().exists());

        store.set_calibration(CalibrationModel::identity(48.0, 9.75, 62.5));
        store.set_angles(AngleUnit::Grads);
        assert!(store.save_if_dirty(&storage).unwrap());
        assert!(!store.is_dirty());

        let reloaded = ConfigStore::load(&storage);
        assert_eq!(reloaded.config(), store.config());
        let text = fs::read_to_string(storage.config_path()).unwrap();
        assert!(text.contains("\"calib\""));
        assert!(text.contains("\"laser_cal\""));
    }

    #[test]
    fn test_fitted_calibration_reloads_exactly() {
        use crate::calibration::synthetic::{standard_capture, Instrument};
        use crate::calibration::CalibrationEngine;

        let (shots, _) = standard_capture();
        let model = CalibrationEngine::new()
            .calibrate(&Instrument::new().batch(&shots, 1))
            .unwrap()
            .model;

        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let mut store = ConfigStore::default();
        store.set_calibration(model.clone());
        assert!(store.save_if_dirty(&storage).unwrap());

        let reloaded = ConfigStore::try_load(&storage.config_path()).unwrap();
        assert_eq!(reloaded.config().calibration.as_ref(), Some(&model));
    }

    #[test]
    fn test_read_only_storage_keeps_dirty_flag() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).read_only(true);
        let mut store = ConfigStore::default();
        store.set_save_readings(true);
        let err = store.save_if_dirty(&storage).unwrap_err();
        assert!(matches!(err, ConfigError::Storage(StorageError::ReadOnly { .. })));
        assert!(store.is_dirty());
    }
}
