//! Utility modules for configuration and sensor axis mapping

pub mod axes;
pub mod config;

pub use axes::{AxisMap, AxisMapError};
pub use config::{Config, ConfigError, ConfigStore};
