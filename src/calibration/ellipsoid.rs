//! General ellipsoid fit
//!
//! Fits `Ax² + By² + Cz² + 2Dxy + 2Exz + 2Fyz + 2Gx + 2Hy + 2Iz = 1` to raw
//! samples and turns the quadric into a symmetric correction that maps the
//! ellipsoid onto the unit sphere. Samples are centred and scaled before the
//! fit to keep the normal equations well conditioned.

use log::debug;
use nalgebra::{Matrix3, Vector3};

use super::model::SensorTransform;
use super::solver::{try_matrix, try_vector, LeastSquares};
use super::{CalibrationError, CalibrationResult, Stage};

/// Unknowns in the quadric
const PARAMS: usize = 9;

pub fn fit_ellipsoid(samples: &[Vector3<f64>], solver: &dyn LeastSquares) -> CalibrationResult<SensorTransform> {
    let n = samples.len();
    if n < PARAMS + 1 {
        return Err(CalibrationError::fit(
            Stage::Ellipsoid,
            format!("{} samples, at least {} needed", n, PARAMS + 1),
        ));
    }

    let mean = samples.iter().sum::<Vector3<f64>>() / n as f64;
    let scale = (samples.iter().map(|s| (s - mean).norm_squared()).sum::<f64>() / n as f64).sqrt();
    if scale <= f64::EPSILON {
        return Err(CalibrationError::fit(Stage::Ellipsoid, "samples do not vary"));
    }
    let points: Vec<Vector3<f64>> = samples.iter().map(|s| (s - mean) / scale).collect();

    let design = try_matrix(n, PARAMS, Stage::Ellipsoid, |r, c| {
        let p = &points[r];
        match c {
            0 => p.x * p.x,
            1 => p.y * p.y,
            2 => p.z * p.z,
            3 => 2.0 * p.x * p.y,
            4 => 2.0 * p.x * p.z,
            5 => 2.0 * p.y * p.z,
            6 => 2.0 * p.x,
            7 => 2.0 * p.y,
            _ => 2.0 * p.z,
        }
    })?;
    let target = try_vector(n, Stage::Ellipsoid, |_| 1.0)?;
    let q = solver
        .solve(&design, &target)
        .map_err(|e| CalibrationError::fit(Stage::Ellipsoid, e))?;

    let quadric = Matrix3::new(q[0], q[3], q[4], q[3], q[1], q[5], q[4], q[5], q[2]);
    let linear = Vector3::new(q[6], q[7], q[8]);
    let inverse = quadric
        .try_inverse()
        .ok_or_else(|| CalibrationError::fit(Stage::Ellipsoid, "quadric is singular"))?;
    let centre = -(inverse * linear);
    let k = 1.0 + centre.dot(&(quadric * centre));
    if k <= 0.0 {
        return Err(CalibrationError::fit(Stage::Ellipsoid, "quadric does not enclose its centre"));
    }

    let eigen = (quadric / k).symmetric_eigen();
    if eigen.eigenvalues.iter().any(|&l| l <= 0.0) {
        return Err(CalibrationError::fit(Stage::Ellipsoid, "samples do not describe an ellipsoid"));
    }
    let root = Matrix3::from_diagonal(&eigen.eigenvalues.map(f64::sqrt));
    let transform = eigen.eigenvectors * root * eigen.eigenvectors.transpose();

    debug!("Ellipsoid fit: {} samples, axis gains {:?}", n, eigen.eigenvalues.map(f64::sqrt).as_slice());

    Ok(SensorTransform { transform: transform / scale, centre: mean + centre * scale })
}
