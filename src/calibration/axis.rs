//! Laser axis alignment
//!
//! Within one run the laser points at a fixed target, so the component of
//! the field along the laser axis stays constant however the instrument is
//! rolled. Solving `a·x + y + c·z = k_r` over all grouped shots gives the
//! laser axis `(a, 1, c)` in each sensor's corrected frame; rotating that
//! axis onto +Y puts both sensors on the same sighting axis and leaves only
//! their roll about it unknown.

use log::debug;
use nalgebra::{Matrix3, Rotation3, Vector3};

use super::grouping::ShotGroup;
use super::solver::{try_matrix, try_vector, LeastSquares};
use super::{CalibrationError, CalibrationResult, Stage};

/// Rotation taking the fitted laser axis of `vectors` onto +Y
pub fn align_laser_axis(
    vectors: &[Vector3<f64>],
    runs: &[ShotGroup],
    solver: &dyn LeastSquares,
) -> CalibrationResult<Matrix3<f64>> {
    let rows: usize = runs.iter().map(ShotGroup::len).sum();
    let cols = 2 + runs.len();
    if rows < cols + 1 {
        return Err(CalibrationError::fit(Stage::AxisCorrection, "not enough grouped shots"));
    }

    let mut members = Vec::new();
    members
        .try_reserve_exact(rows)
        .map_err(|_| CalibrationError::ResourceExhaustion { stage: Stage::AxisCorrection, requested: rows })?;
    for (r, run) in runs.iter().enumerate() {
        for i in run.range() {
            let v = vectors[i]
                .try_normalize(f64::EPSILON)
                .ok_or_else(|| CalibrationError::fit(Stage::AxisCorrection, format!("sample {} is zero", i)))?;
            members.push((r, v));
        }
    }

    let design = try_matrix(rows, cols, Stage::AxisCorrection, |row, col| {
        let (run, v) = members[row];
        match col {
            0 => v.x,
            1 => v.z,
            c if c == 2 + run => -1.0,
            _ => 0.0,
        }
    })?;
    let target = try_vector(rows, Stage::AxisCorrection, |row| -members[row].1.y)?;
    let coeffs = solver
        .solve(&design, &target)
        .map_err(|e| CalibrationError::fit(Stage::AxisCorrection, e))?;

    let axis = Vector3::new(coeffs[0], 1.0, coeffs[1]).normalize();
    debug!("Laser axis in sensor frame: {:.5?}", axis.as_slice());
    let rotation = Rotation3::rotation_between(&axis, &Vector3::y())
        .ok_or_else(|| CalibrationError::fit(Stage::AxisCorrection, "laser axis is reversed"))?;
    Ok(rotation.into_inner())
}
