//! Calibration accuracy score and quality bands

use nalgebra::Vector3;

use super::grouping::ShotGroup;
use super::model::{direction, CalibrationModel};

/// Qualitative rating shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyBand {
    /// Score below 0.25
    Excellent,
    /// Score below 0.5
    Good,
    /// Score below 1.0
    Acceptable,
    Poor,
}

impl AccuracyBand {
    pub fn from_score(score: f64) -> Self {
        if score < 0.25 {
            AccuracyBand::Excellent
        } else if score < 0.5 {
            AccuracyBand::Good
        } else if score < 1.0 {
            AccuracyBand::Acceptable
        } else {
            AccuracyBand::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccuracyBand::Excellent => "excellent",
            AccuracyBand::Good => "good",
            AccuracyBand::Acceptable => "acceptable",
            AccuracyBand::Poor => "poor",
        }
    }
}

/// RMS angle in degrees between each grouped shot and its run's mean
/// direction, using `model` on the raw samples. Never negative; shots whose
/// direction is undefined count as 90° off.
pub fn accuracy(model: &CalibrationModel, mag: &[Vector3<f64>], grav: &[Vector3<f64>], runs: &[ShotGroup]) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for run in runs {
        let directions: Vec<Option<Vector3<f64>>> = run
            .range()
            .map(|i| {
                let (m, g) = model.correct(&mag[i], &grav[i]);
                direction(&m, &g)
            })
            .collect();
        let mean = directions.iter().flatten().sum::<Vector3<f64>>().try_normalize(f64::EPSILON);
        for d in &directions {
            let angle = match (d, mean) {
                (Some(d), Some(mean)) => d.angle(&mean).to_degrees(),
                _ => 90.0,
            };
            sum_sq += angle * angle;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}
