//! Joint non-linear refinement
//!
//! The linear stages each fix one degree of freedom in isolation. This stage
//! polishes them together with Levenberg-Marquardt over five small angles: a
//! full rotation of the magnetometer and a tilt of the accelerometer about X
//! and Z (its roll about Y is the shared, unobservable one). Residuals are
//! each grouped shot's direction deviation from its run mean plus its dip
//! deviation from the overall mean. Only improving steps are accepted, so the
//! model never gets worse than what the linear stages produced.

use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};

use super::grouping::ShotGroup;
use super::model::{dip_angle, direction};
use super::solver::try_matrix;
use super::{CalibrationError, CalibrationResult, Stage};

const PARAMS: usize = 5;
const STEP: f64 = 1e-7;

/// Rotations found by the refinement
#[derive(Debug, Clone)]
pub struct Refinement {
    pub mag_rotation: Matrix3<f64>,
    pub grav_rotation: Matrix3<f64>,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
}

struct Problem<'a> {
    mag: &'a [Vector3<f64>],
    grav: &'a [Vector3<f64>],
    runs: &'a [ShotGroup],
}

fn rotations(p: &DVector<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    let mag = Rotation3::new(Vector3::new(p[0], p[1], p[2])).into_inner();
    let grav = Rotation3::new(Vector3::new(p[3], 0.0, p[4])).into_inner();
    (mag, grav)
}

impl Problem<'_> {
    fn shots(&self) -> usize {
        self.runs.iter().map(ShotGroup::len).sum()
    }

    fn residuals(&self, p: &DVector<f64>) -> CalibrationResult<DVector<f64>> {
        let (rm, rg) = rotations(p);
        let shots = self.shots();
        let mut out = Vec::new();
        out.try_reserve_exact(4 * shots)
            .map_err(|_| CalibrationError::ResourceExhaustion { stage: Stage::Refinement, requested: 4 * shots })?;

        let mut dips = Vec::with_capacity(shots);
        for run in self.runs {
            let mut directions = Vec::with_capacity(run.len());
            for i in run.range() {
                let (m, g) = (rm * self.mag[i], rg * self.grav[i]);
                let d = direction(&m, &g)
                    .ok_or_else(|| CalibrationError::fit(Stage::Refinement, format!("shot {} is degenerate", i)))?;
                directions.push(d);
                dips.push(dip_angle(&m, &g).to_radians());
            }
            let mean = directions.iter().sum::<Vector3<f64>>().normalize();
            for d in &directions {
                out.extend((d - mean).iter());
            }
        }
        let mean_dip = dips.iter().sum::<f64>() / dips.len().max(1) as f64;
        out.extend(dips.iter().map(|d| d - mean_dip));
        Ok(DVector::from_vec(out))
    }

    fn jacobian(&self, p: &DVector<f64>, base: &DVector<f64>) -> CalibrationResult<DMatrix<f64>> {
        let mut columns = Vec::with_capacity(PARAMS);
        for k in 0..PARAMS {
            let mut shifted = p.clone();
            shifted[k] += STEP;
            columns.push((self.residuals(&shifted)? - base) / STEP);
        }
        try_matrix(base.len(), PARAMS, Stage::Refinement, |r, c| columns[c][r])
    }
}

pub fn refine(
    mag: &[Vector3<f64>],
    grav: &[Vector3<f64>],
    runs: &[ShotGroup],
    max_iterations: usize,
) -> CalibrationResult<Refinement> {
    let problem = Problem { mag, grav, runs };
    let mut params = DVector::zeros(PARAMS);
    let mut residuals = problem.residuals(&params)?;
    let mut cost = residuals.norm_squared();
    let initial_cost = cost;

    let mut lambda = 1e-3;
    let nu = 10.0;
    let mut iterations = 0;

    for iteration in 0..max_iterations {
        iterations = iteration + 1;
        let jacobian = problem.jacobian(&params, &residuals)?;
        let jt_j = jacobian.tr_mul(&jacobian);
        let jt_r = jacobian.tr_mul(&residuals);
        if jt_r.norm() < 1e-14 {
            break;
        }

        let mut augmented = jt_j.clone();
        for i in 0..PARAMS {
            augmented[(i, i)] += lambda * (jt_j[(i, i)] + 1e-12);
        }
        let Ok(step) = augmented.svd(true, true).solve(&jt_r, 1e-12) else {
            break;
        };

        let candidate = &params - step;
        let candidate_residuals = problem.residuals(&candidate)?;
        let candidate_cost = candidate_residuals.norm_squared();
        if candidate_cost < cost {
            let gain = cost - candidate_cost;
            params = candidate;
            residuals = candidate_residuals;
            cost = candidate_cost;
            lambda = (lambda / nu).max(1e-12);
            if gain < 1e-15 * (1.0 + cost) {
                break;
            }
        } else {
            lambda *= nu;
            if lambda > 1e6 {
                break;
            }
        }
    }

    debug!("Refinement: cost {:.3e} -> {:.3e} in {} iterations", initial_cost, cost, iterations);
    let (mag_rotation, grav_rotation) = rotations(&params);
    Ok(Refinement { mag_rotation, grav_rotation, initial_cost, final_cost: cost, iterations })
}
