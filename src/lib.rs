//! Cave Survey Instrument
//!
//! Firmware core for a handheld cave-surveying instrument: a laser
//! rangefinder, a magnetometer and an accelerometer combined into survey
//! legs. The crate holds the task supervisor, the measurement state machine
//! and the compass/clinometer calibration engine, all running on a single
//! cooperative tokio thread against the traits in [`hardware`].

pub mod api;
pub mod calibration;
pub mod core;
pub mod hardware;
pub mod measurement;
pub mod menu;
pub mod processing;
pub mod supervisor;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use crate::core::{Button, Click, InputBus, InputEvent, Leg, Mode, RemoteCommand};
pub use calibration::{CalibrationEngine, CalibrationError, CalibrationModel, CalibrationOutcome};
pub use hardware::{Hardware, MockHardware, Storage};
pub use measurement::MeasureError;
pub use supervisor::{after_session, run_session, startup_allowed, DeviceContext, SessionReport, Supervisor};
pub use utils::{Config, ConfigStore};
pub use validation::{ErrorKind, Fault};
