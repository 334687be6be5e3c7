//! Field anomaly detection
//!
//! A reading is suspect when the magnetic or gravity magnitude, or the dip
//! between them, drifts from the values captured at calibration time. Iron
//! near the instrument shows up in the first, a moving hand in the second.

use serde::{Deserialize, Serialize};

/// Thresholds on deviation from the calibration reference.
///
/// Magnitudes are percentages of the reference strength, dip is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyStrictness {
    pub mag: f64,
    pub grav: f64,
    pub dip: f64,
}

impl AnomalyStrictness {
    pub const RELAXED: AnomalyStrictness = AnomalyStrictness { mag: 10.0, grav: 5.0, dip: 5.0 };
    pub const STRICT: AnomalyStrictness = AnomalyStrictness { mag: 5.0, grav: 3.0, dip: 3.0 };
}

/// Configured anomaly checking level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrictnessLevel {
    Off,
    #[default]
    Relaxed,
    Strict,
}

impl StrictnessLevel {
    pub fn thresholds(self) -> Option<AnomalyStrictness> {
        match self {
            StrictnessLevel::Off => None,
            StrictnessLevel::Relaxed => Some(AnomalyStrictness::RELAXED),
            StrictnessLevel::Strict => Some(AnomalyStrictness::STRICT),
        }
    }

    pub fn next(self) -> Self {
        match self {
            StrictnessLevel::Off => StrictnessLevel::Relaxed,
            StrictnessLevel::Relaxed => StrictnessLevel::Strict,
            StrictnessLevel::Strict => StrictnessLevel::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StrictnessLevel::Off => "Off",
            StrictnessLevel::Relaxed => "Relaxed",
            StrictnessLevel::Strict => "Strict",
        }
    }
}

/// Field values observed for one shot, or stored as reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSignature {
    pub mag_strength: f64,
    pub grav_strength: f64,
    /// Degrees
    pub dip: f64,
}

/// First violated threshold
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Anomaly {
    #[error("magnetic field {observed:.3} differs from {expected:.3} by more than {limit}%")]
    Magnetic { observed: f64, expected: f64, limit: f64 },
    #[error("gravity {observed:.3} differs from {expected:.3} by more than {limit}%")]
    Gravity { observed: f64, expected: f64, limit: f64 },
    #[error("dip {observed:.1}° differs from {expected:.1}° by more than {limit}°")]
    Dip { observed: f64, expected: f64, limit: f64 },
}

fn percent_off(observed: f64, expected: f64) -> f64 {
    if expected.abs() < f64::EPSILON {
        return f64::INFINITY;
    }
    ((observed - expected) / expected).abs() * 100.0
}

/// Checks magnetic strength, then gravity strength, then dip
pub fn check_anomaly(
    observed: &FieldSignature,
    reference: &FieldSignature,
    strictness: &AnomalyStrictness,
) -> Result<(), Anomaly> {
    if percent_off(observed.mag_strength, reference.mag_strength) > strictness.mag {
        return Err(Anomaly::Magnetic {
            observed: observed.mag_strength,
            expected: reference.mag_strength,
            limit: strictness.mag,
        });
    }
    if percent_off(observed.grav_strength, reference.grav_strength) > strictness.grav {
        return Err(Anomaly::Gravity {
            observed: observed.grav_strength,
            expected: reference.grav_strength,
            limit: strictness.grav,
        });
    }
    if (observed.dip - reference.dip).abs() > strictness.dip {
        return Err(Anomaly::Dip { observed: observed.dip, expected: reference.dip, limit: strictness.dip });
    }
    Ok(())
}
