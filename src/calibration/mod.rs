//! Calibration engine
//!
//! Converts a batch of raw magnetometer/accelerometer sample pairs into a
//! [`CalibrationModel`]. The stages run strictly in order and any failure
//! abandons the whole fit:
//!
//! 1. ellipsoid fit per sensor ([`ellipsoid`])
//! 2. grouping of shots aimed at one target ([`grouping`])
//! 3. laser axis alignment per sensor ([`axis`])
//! 4. relative roll alignment ([`roll`])
//! 5. joint non-linear refinement ([`refine`])
//! 6. accuracy scoring ([`score`])
//!
//! The engine holds no state between runs. After a reset it is simply run
//! again on the persisted [`SampleBatch`].

pub mod axis;
pub mod ellipsoid;
pub mod engine;
pub mod grouping;
pub mod model;
pub mod refine;
pub mod roll;
pub mod samples;
pub mod score;
pub mod solver;

#[cfg(test)]
pub(crate) mod synthetic;

use std::fmt;

use crate::validation::ErrorKind;

pub use engine::{CalibrationEngine, CalibrationOptions, CalibrationOutcome};
pub use grouping::ShotGroup;
pub use model::{CalibrationModel, Orientation, SensorTransform};
pub use samples::SampleBatch;
pub use score::AccuracyBand;
pub use solver::{CholeskySolver, LeastSquares, QrSolver, SolveError, SvdSolver};

/// Pipeline stage, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Samples,
    Ellipsoid,
    Grouping,
    AxisCorrection,
    RollAlignment,
    Refinement,
    Scoring,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Samples => "sample validation",
            Stage::Ellipsoid => "ellipsoid fit",
            Stage::Grouping => "shot grouping",
            Stage::AxisCorrection => "axis correction",
            Stage::RollAlignment => "roll alignment",
            Stage::Refinement => "refinement",
            Stage::Scoring => "scoring",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("{stage} failed: {reason}")]
    FitFailure { stage: Stage, reason: String },
    #[error("{stage} could not allocate {requested} values")]
    ResourceExhaustion { stage: Stage, requested: usize },
    #[error("calibration data unavailable: {message}")]
    Unavailable { message: String },
}

impl CalibrationError {
    pub fn fit(stage: Stage, reason: impl fmt::Display) -> Self {
        CalibrationError::FitFailure { stage, reason: reason.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CalibrationError::FitFailure { .. } | CalibrationError::Unavailable { .. } => {
                ErrorKind::CalibrationFitFailure
            }
            CalibrationError::ResourceExhaustion { .. } => ErrorKind::ResourceExhaustion,
        }
    }
}

/// Result type for calibration stages
pub type CalibrationResult<T> = Result<T, CalibrationError>;
