//! Calibration model and orientation maths
//!
//! Device frame: +Y is the laser axis, +Z is up when the instrument is held
//! level with the screen facing the sky. The accelerometer reports the
//! reaction to gravity, so a level device reads roughly `+Z`.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::validation::FieldSignature;

/// Affine correction for one triaxial sensor: `transform * (raw - centre)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTransform {
    pub transform: Matrix3<f64>,
    pub centre: Vector3<f64>,
}

impl SensorTransform {
    pub fn identity() -> Self {
        Self { transform: Matrix3::identity(), centre: Vector3::zeros() }
    }

    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        self.transform * (raw - self.centre)
    }

    /// The same correction followed by `rotation`
    pub fn rotated(&self, rotation: &Matrix3<f64>) -> Self {
        Self { transform: rotation * self.transform, centre: self.centre }
    }
}

/// Instrument attitude in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub azimuth: f64,
    pub inclination: f64,
    pub roll: f64,
}

/// East, north and up expressed in device coordinates
fn world_axes(mag: &Vector3<f64>, grav: &Vector3<f64>) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let up = grav.try_normalize(1e-12)?;
    let east = mag.cross(&up).try_normalize(1e-9 * mag.norm().max(1e-12))?;
    let north = up.cross(&east);
    Some((east, north, up))
}

/// Attitude from corrected field vectors; `None` when they are degenerate
pub fn orientation(mag: &Vector3<f64>, grav: &Vector3<f64>) -> Option<Orientation> {
    let (east, north, up) = world_axes(mag, grav)?;
    let mut azimuth = east.y.atan2(north.y).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }
    if azimuth >= 360.0 {
        azimuth -= 360.0;
    }
    // Never report a negative zero heading
    azimuth = azimuth.abs();
    let inclination = up.y.clamp(-1.0, 1.0).asin().to_degrees();
    let roll = up.x.atan2(up.z).to_degrees();
    Some(Orientation { azimuth, inclination, roll })
}

/// Laser direction as an east/north/up unit vector
pub fn direction(mag: &Vector3<f64>, grav: &Vector3<f64>) -> Option<Vector3<f64>> {
    let (east, north, up) = world_axes(mag, grav)?;
    Some(Vector3::new(east.y, north.y, up.y))
}

/// Magnetic dip in degrees, positive when the field points down
pub fn dip_angle(mag: &Vector3<f64>, grav: &Vector3<f64>) -> f64 {
    let denom = mag.norm() * grav.norm();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let cos = (mag.dot(grav) / denom).clamp(-1.0, 1.0);
    cos.acos().to_degrees() - 90.0
}

/// Complete sensor-fusion model. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub mag: SensorTransform,
    pub grav: SensorTransform,
    /// Mean corrected magnetic magnitude at calibration time
    pub mag_strength: f64,
    /// Mean corrected gravity magnitude at calibration time
    pub grav_strength: f64,
    /// Mean dip over the grouped shots (degrees)
    pub dip: f64,
    /// Accuracy score, RMS degrees
    pub accuracy: f64,
}

impl CalibrationModel {
    /// Pass-through model for sensors that need no correction
    pub fn identity(mag_strength: f64, grav_strength: f64, dip: f64) -> Self {
        Self {
            mag: SensorTransform::identity(),
            grav: SensorTransform::identity(),
            mag_strength,
            grav_strength,
            dip,
            accuracy: 0.0,
        }
    }

    pub fn correct(&self, mag: &Vector3<f64>, grav: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
        (self.mag.apply(mag), self.grav.apply(grav))
    }

    pub fn orientation(&self, mag: &Vector3<f64>, grav: &Vector3<f64>) -> Option<Orientation> {
        let (m, g) = self.correct(mag, grav);
        orientation(&m, &g)
    }

    /// Field values of a raw reading, for anomaly checks
    pub fn observe(&self, mag: &Vector3<f64>, grav: &Vector3<f64>) -> FieldSignature {
        let (m, g) = self.correct(mag, grav);
        FieldSignature { mag_strength: m.norm(), grav_strength: g.norm(), dip: dip_angle(&m, &g) }
    }

    pub fn reference(&self) -> FieldSignature {
        FieldSignature { mag_strength: self.mag_strength, grav_strength: self.grav_strength, dip: self.dip }
    }
}
