//! Raw calibration samples, as persisted in `calibration_data.json`

use std::fs;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{CalibrationError, CalibrationResult, Stage};

/// Paired raw sensor readings, one pair per captured shot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub mag: Vec<[f64; 3]>,
    pub grav: Vec<[f64; 3]>,
}

impl SampleBatch {
    pub fn push(&mut self, mag: Vector3<f64>, grav: Vector3<f64>) {
        self.mag.push([mag.x, mag.y, mag.z]);
        self.grav.push([grav.x, grav.y, grav.z]);
    }

    pub fn len(&self) -> usize {
        self.mag.len().min(self.grav.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> CalibrationResult<()> {
        if self.mag.len() != self.grav.len() {
            return Err(CalibrationError::fit(
                Stage::Samples,
                format!("{} magnetometer samples but {} accelerometer samples", self.mag.len(), self.grav.len()),
            ));
        }
        if let Some(i) = self.mag.iter().chain(&self.grav).position(|v| v.iter().any(|c| !c.is_finite())) {
            return Err(CalibrationError::fit(Stage::Samples, format!("sample {} is not finite", i % self.mag.len().max(1))));
        }
        Ok(())
    }

    pub fn mag_vectors(&self) -> Vec<Vector3<f64>> {
        self.mag.iter().map(|v| Vector3::from(*v)).collect()
    }

    pub fn grav_vectors(&self) -> Vec<Vector3<f64>> {
        self.grav.iter().map(|v| Vector3::from(*v)).collect()
    }

    pub fn load(path: &Path) -> CalibrationResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| CalibrationError::Unavailable {
            message: format!("cannot read '{}': {}", path.display(), e),
        })?;
        let batch: SampleBatch = serde_json::from_str(&text).map_err(|e| CalibrationError::Unavailable {
            message: format!("cannot parse '{}': {}", path.display(), e),
        })?;
        batch.validate()?;
        Ok(batch)
    }

    pub fn to_json(&self) -> String {
        // Plain arrays of floats always serialise
        serde_json::to_string(self).unwrap_or_default()
    }
}
