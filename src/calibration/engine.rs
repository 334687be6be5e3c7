//! Calibration pipeline driver

use log::{debug, info};
use nalgebra::Vector3;

use super::axis::align_laser_axis;
use super::ellipsoid::fit_ellipsoid;
use super::grouping::{find_runs, ShotGroup};
use super::model::{dip_angle, direction, CalibrationModel, SensorTransform};
use super::refine::refine;
use super::roll::align_roll;
use super::samples::SampleBatch;
use super::score::{accuracy, AccuracyBand};
use super::solver::{CholeskySolver, LeastSquares};
use super::{CalibrationError, CalibrationResult, Stage};

/// Tunables for the pipeline
#[derive(Debug, Clone, Copy)]
pub struct CalibrationOptions {
    /// Largest pairwise angle inside a run
    pub run_tolerance_deg: f64,
    pub min_run_len: usize,
    pub min_samples: usize,
    /// Batches larger than this would not fit in working memory
    pub max_samples: usize,
    pub refine_iterations: usize,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self { run_tolerance_deg: 5.0, min_run_len: 3, min_samples: 12, max_samples: 400, refine_iterations: 25 }
    }
}

/// A finished fit awaiting the operator's decision
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub model: CalibrationModel,
    pub band: AccuracyBand,
    pub runs: Vec<ShotGroup>,
}

impl CalibrationOutcome {
    pub fn accuracy(&self) -> f64 {
        self.model.accuracy
    }
}

pub struct CalibrationEngine {
    solver: Box<dyn LeastSquares>,
    options: CalibrationOptions,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationEngine {
    pub fn new() -> Self {
        Self { solver: Box::new(CholeskySolver), options: CalibrationOptions::default() }
    }

    pub fn with_solver(mut self, solver: Box<dyn LeastSquares>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_options(mut self, options: CalibrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CalibrationOptions {
        &self.options
    }

    /// Run every stage on `batch`. Nothing is kept between calls.
    pub fn calibrate(&self, batch: &SampleBatch) -> CalibrationResult<CalibrationOutcome> {
        batch.validate()?;
        let n = batch.len();
        if n > self.options.max_samples {
            return Err(CalibrationError::ResourceExhaustion { stage: Stage::Samples, requested: n });
        }
        if n < self.options.min_samples {
            return Err(CalibrationError::fit(
                Stage::Samples,
                format!("{} samples, at least {} needed", n, self.options.min_samples),
            ));
        }
        info!("Calibrating from {} samples", n);
        let solver = self.solver.as_ref();
        let raw_mag = batch.mag_vectors();
        let raw_grav = batch.grav_vectors();

        let mut mag_t = fit_ellipsoid(&raw_mag, solver)?;
        let mut grav_t = fit_ellipsoid(&raw_grav, solver)?;
        debug!("Ellipsoid stage done");

        let (mag, grav) = (correct_all(&mag_t, &raw_mag), correct_all(&grav_t, &raw_grav));
        let directions: Vec<Option<Vector3<f64>>> = mag.iter().zip(&grav).map(|(m, g)| direction(m, g)).collect();
        let runs = find_runs(&directions, self.options.run_tolerance_deg.to_radians(), self.options.min_run_len);
        if runs.is_empty() {
            return Err(CalibrationError::fit(Stage::Grouping, "no runs of shots at a common target"));
        }
        debug!("Found {} runs: {:?}", runs.len(), runs);

        mag_t = mag_t.rotated(&align_laser_axis(&mag, &runs, solver)?);
        grav_t = grav_t.rotated(&align_laser_axis(&grav, &runs, solver)?);

        let (mag, grav) = (correct_all(&mag_t, &raw_mag), correct_all(&grav_t, &raw_grav));
        let grouped = |v: &[Vector3<f64>]| -> Vec<Vector3<f64>> {
            runs.iter().flat_map(|run| v[run.range()].iter().copied()).collect()
        };
        let roll = align_roll(&grouped(&mag), &grouped(&grav), solver)?;
        mag_t = mag_t.rotated(&roll.rotation);
        debug!("Roll stage: {} passes, {:?}", roll.corrections.len(), roll.corrections);

        let (mag, grav) = (correct_all(&mag_t, &raw_mag), correct_all(&grav_t, &raw_grav));
        let refinement = refine(&mag, &grav, &runs, self.options.refine_iterations)?;
        mag_t = mag_t.rotated(&refinement.mag_rotation);
        grav_t = grav_t.rotated(&refinement.grav_rotation);

        let (mag, grav) = (correct_all(&mag_t, &raw_mag), correct_all(&grav_t, &raw_grav));
        let grouped_dips: Vec<f64> =
            runs.iter().flat_map(|run| run.range()).map(|i| dip_angle(&mag[i], &grav[i])).collect();

        let mut model = CalibrationModel {
            mag: mag_t,
            grav: grav_t,
            mag_strength: mean(mag.iter().map(|v| v.norm())),
            grav_strength: mean(grav.iter().map(|v| v.norm())),
            dip: mean(grouped_dips.into_iter()),
            accuracy: 0.0,
        };
        model.accuracy = accuracy(&model, &raw_mag, &raw_grav, &runs);
        if !model.accuracy.is_finite() {
            return Err(CalibrationError::fit(Stage::Scoring, "score is not finite"));
        }
        let band = AccuracyBand::from_score(model.accuracy);
        info!("Calibration accuracy {:.3}° ({})", model.accuracy, band.label());

        Ok(CalibrationOutcome { model, band, runs })
    }
}

fn correct_all(transform: &SensorTransform, raw: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    raw.iter().map(|v| transform.apply(v)).collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
