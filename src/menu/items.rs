//! Menu entries and the settings they cycle

use crate::api::formatting::{AngleUnit, DistanceUnit};
use crate::utils::{Config, ConfigError, ConfigStore};

/// Work done by the MenuItem foreground task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    CalibrateSensors,
    CalibrateLaser,
    CalFromSaved,
    RawReadings,
    CalibratedReadings,
    Orientation,
    DeviceInfo,
    /// Offer a fresh calibration for acceptance; started by the lifecycle, not listed
    ShowCalibrationResult,
}

impl MenuAction {
    pub fn label(self) -> &'static str {
        match self {
            MenuAction::CalibrateSensors => "Calibrate sensors",
            MenuAction::CalibrateLaser => "Calibrate laser",
            MenuAction::CalFromSaved => "Cal from saved",
            MenuAction::RawReadings => "Raw data",
            MenuAction::CalibratedReadings => "Calibrated data",
            MenuAction::Orientation => "Orientation",
            MenuAction::DeviceInfo => "Device info",
            MenuAction::ShowCalibrationResult => "Calibration result",
        }
    }
}

/// Settings changed in place from the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Timeout,
    ShotTimer,
    Units,
    Angles,
    AnomalyDetection,
    SaveReadings,
}

const TIMEOUTS: [u64; 5] = [30, 60, 120, 180, 300];
const SHOT_TIMERS: [u64; 4] = [0, 3, 5, 10];

/// Option after `current`, wrapping. Values off the list snap to the next
/// larger option.
fn next_option(options: &[u64], current: u64) -> u64 {
    match options.iter().position(|&o| o == current) {
        Some(i) => options[(i + 1) % options.len()],
        None => options.iter().copied().find(|&o| o > current).unwrap_or(options[0]),
    }
}

impl Setting {
    pub fn label(self, config: &Config) -> String {
        match self {
            Setting::Timeout => format!("Timeout: {}s", config.timeout),
            Setting::ShotTimer if config.shot_timer == 0 => "Shot timer: Off".to_string(),
            Setting::ShotTimer => format!("Shot timer: {}s", config.shot_timer),
            Setting::Units => match config.units {
                DistanceUnit::Metric => "Units: Metric".to_string(),
                DistanceUnit::Imperial => "Units: Imperial".to_string(),
            },
            Setting::Angles => match config.angles {
                AngleUnit::Degrees => "Angles: Degrees".to_string(),
                AngleUnit::Grads => "Angles: Grads".to_string(),
            },
            Setting::AnomalyDetection => format!("Anomaly: {}", config.anomaly_strictness.label()),
            Setting::SaveReadings => format!("Save readings: {}", if config.save_readings { "On" } else { "Off" }),
        }
    }

    /// Step to the next value through the store's setters
    pub fn cycle(self, store: &mut ConfigStore) -> Result<(), ConfigError> {
        let config = store.config().clone();
        match self {
            Setting::Timeout => {
                store.set_timeout(next_option(&TIMEOUTS, config.timeout))?;
            }
            Setting::ShotTimer => {
                store.set_shot_timer(next_option(&SHOT_TIMERS, config.shot_timer))?;
            }
            Setting::Units => {
                store.set_units(config.units.next());
            }
            Setting::Angles => {
                store.set_angles(config.angles.next());
            }
            Setting::AnomalyDetection => {
                store.set_anomaly_strictness(config.anomaly_strictness.next());
            }
            Setting::SaveReadings => {
                store.set_save_readings(!config.save_readings);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    Action(MenuAction),
    Setting(Setting),
    /// Leave the menu for measuring
    Back,
}

pub const ENTRIES: [MenuEntry; 14] = [
    MenuEntry::Action(MenuAction::CalibrateSensors),
    MenuEntry::Action(MenuAction::CalibrateLaser),
    MenuEntry::Action(MenuAction::CalFromSaved),
    MenuEntry::Action(MenuAction::RawReadings),
    MenuEntry::Action(MenuAction::CalibratedReadings),
    MenuEntry::Action(MenuAction::Orientation),
    MenuEntry::Action(MenuAction::DeviceInfo),
    MenuEntry::Setting(Setting::Timeout),
    MenuEntry::Setting(Setting::ShotTimer),
    MenuEntry::Setting(Setting::Units),
    MenuEntry::Setting(Setting::Angles),
    MenuEntry::Setting(Setting::AnomalyDetection),
    MenuEntry::Setting(Setting::SaveReadings),
    MenuEntry::Back,
];

impl MenuEntry {
    pub fn label(self, config: &Config) -> String {
        match self {
            MenuEntry::Action(action) => action.label().to_string(),
            MenuEntry::Setting(setting) => setting.label(config),
            MenuEntry::Back => "Back".to_string(),
        }
    }
}

pub fn labels(config: &Config) -> Vec<String> {
    ENTRIES.iter().map(|entry| entry.label(config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::StrictnessLevel;

    #[test]
    fn test_next_option_wraps_and_snaps() {
        assert_eq!(next_option(&TIMEOUTS, 120), 180);
        assert_eq!(next_option(&TIMEOUTS, 300), 30);
        assert_eq!(next_option(&TIMEOUTS, 90), 120);
        assert_eq!(next_option(&TIMEOUTS, 3600), 30);
        assert_eq!(next_option(&SHOT_TIMERS, 10), 0);
    }

    #[test]
    fn test_cycling_marks_store_dirty() {
        let mut store = ConfigStore::default();
        assert!(!store.is_dirty());
        Setting::Timeout.cycle(&mut store).unwrap();
        assert!(store.is_dirty());
        assert_eq!(store.config().timeout, 180);

        Setting::AnomalyDetection.cycle(&mut store).unwrap();
        assert_eq!(store.config().anomaly_strictness, StrictnessLevel::Strict);
        Setting::ShotTimer.cycle(&mut store).unwrap();
        Setting::SaveReadings.cycle(&mut store).unwrap();
        Setting::Units.cycle(&mut store).unwrap();

        let labels = labels(store.config());
        assert_eq!(labels.len(), ENTRIES.len());
        assert_eq!(labels[7], "Timeout: 180s");
        assert_eq!(labels[8], "Shot timer: 3s");
        assert_eq!(labels[9], "Units: Imperial");
        assert_eq!(labels[11], "Anomaly: Strict");
        assert_eq!(labels[12], "Save readings: On");
        assert_eq!(labels[13], "Back");
    }

    #[test]
    fn test_result_action_is_not_listed() {
        assert!(!ENTRIES.contains(&MenuEntry::Action(MenuAction::ShowCalibrationResult)));
    }
}
