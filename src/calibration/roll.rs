//! Relative roll alignment
//!
//! After axis alignment both sensors agree on the laser axis but may still be
//! rolled about it relative to each other. That relative roll makes the dip
//! (the angle between the two field vectors) vary with instrument attitude.
//! Each pass linearises `m·g` in `sin θ` of a rotation of the magnetometer
//! about +Y, solves `m·g = s·(m_x g_z − m_z g_x) + K` for `s`, and composes
//! the rotation. The correction must shrink every pass.

use log::debug;
use nalgebra::{Matrix3, Vector3};

use super::solver::{try_matrix, try_vector, LeastSquares};
use super::{CalibrationError, CalibrationResult, Stage};

/// Upper bound on linearisation passes
pub const MAX_PASSES: usize = 3;

/// Corrections smaller than this end the iteration early
const CONVERGED: f64 = 1e-7;

/// Rotation about +Y by the angle with sine `s`
pub fn roll_rotation(s: f64) -> Matrix3<f64> {
    let c = (1.0 - s * s).max(0.0).sqrt();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// Result of the roll stage
#[derive(Debug, Clone)]
pub struct RollAlignment {
    /// Rotation to apply after the magnetometer transform
    pub rotation: Matrix3<f64>,
    /// `sin θ` estimated by each pass, in order
    pub corrections: Vec<f64>,
}

pub fn align_roll(
    mag: &[Vector3<f64>],
    grav: &[Vector3<f64>],
    solver: &dyn LeastSquares,
) -> CalibrationResult<RollAlignment> {
    if mag.len() != grav.len() || mag.len() < 3 {
        return Err(CalibrationError::fit(Stage::RollAlignment, "need at least three paired shots"));
    }
    let grav: Vec<Vector3<f64>> = grav.iter().map(|g| g.normalize()).collect();

    let mut rotation = Matrix3::identity();
    let mut corrections = Vec::with_capacity(MAX_PASSES);
    let mut previous = 1.0f64;

    for pass in 0..MAX_PASSES {
        let rotated: Vec<Vector3<f64>> = mag.iter().map(|m| (rotation * m).normalize()).collect();
        let design = try_matrix(rotated.len(), 2, Stage::RollAlignment, |r, c| match c {
            0 => rotated[r].x * grav[r].z - rotated[r].z * grav[r].x,
            _ => 1.0,
        })?;
        let target = try_vector(rotated.len(), Stage::RollAlignment, |r| rotated[r].dot(&grav[r]))?;
        let s = solver
            .solve(&design, &target)
            .map_err(|e| CalibrationError::fit(Stage::RollAlignment, e))?[0];

        debug!("Roll pass {}: sin θ = {:.3e}", pass + 1, s);
        if !s.is_finite() || s.abs() >= previous {
            return Err(CalibrationError::fit(
                Stage::RollAlignment,
                format!("correction {:.3e} did not shrink from {:.3e}", s, previous),
            ));
        }
        corrections.push(s);
        rotation = roll_rotation(s) * rotation;
        previous = s.abs();
        if previous < CONVERGED {
            break;
        }
    }

    Ok(RollAlignment { rotation, corrections })
}
