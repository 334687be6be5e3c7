//! Error classification and reading validation

pub mod anomaly;
pub mod error;

pub use anomaly::{check_anomaly, Anomaly, AnomalyStrictness, FieldSignature, StrictnessLevel};
pub use error::{ErrorKind, ErrorSeverity, Fault, Propagation};
