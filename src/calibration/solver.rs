//! Linear least-squares backends
//!
//! Every calibration stage builds a design matrix and a target and asks a
//! [`LeastSquares`] implementation for the coefficients. Swapping the backend
//! never touches stage logic.

use nalgebra::{DMatrix, DVector};

use super::{CalibrationError, CalibrationResult, Stage};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("design has {rows} rows but target has {targets} entries")]
    DimensionMismatch { rows: usize, targets: usize },
    #[error("{rows} equations cannot determine {unknowns} unknowns")]
    Underdetermined { rows: usize, unknowns: usize },
    #[error("system is singular")]
    Singular,
}

/// Minimise `|design * x - target|`
pub trait LeastSquares {
    fn solve(&self, design: &DMatrix<f64>, target: &DVector<f64>) -> Result<DVector<f64>, SolveError>;
}

fn check_shape(design: &DMatrix<f64>, target: &DVector<f64>) -> Result<(), SolveError> {
    if design.nrows() != target.len() {
        return Err(SolveError::DimensionMismatch { rows: design.nrows(), targets: target.len() });
    }
    if design.nrows() < design.ncols() {
        return Err(SolveError::Underdetermined { rows: design.nrows(), unknowns: design.ncols() });
    }
    Ok(())
}

/// Smallest acceptable ratio between Cholesky pivots
const PIVOT_RATIO: f64 = 1e-7;

/// Normal equations through a Cholesky factorisation. Smallest footprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CholeskySolver;

impl LeastSquares for CholeskySolver {
    fn solve(&self, design: &DMatrix<f64>, target: &DVector<f64>) -> Result<DVector<f64>, SolveError> {
        check_shape(design, target)?;
        let normal = design.tr_mul(design);
        let rhs = design.tr_mul(target);
        let chol = normal.cholesky().ok_or(SolveError::Singular)?;
        // Rounding can leave a tiny positive pivot on a rank-deficient system
        let diagonal = chol.l_dirty().diagonal();
        if diagonal.min() <= PIVOT_RATIO * diagonal.max() {
            return Err(SolveError::Singular);
        }
        Ok(chol.solve(&rhs))
    }
}

/// Householder QR; better conditioned than the normal equations
#[derive(Debug, Clone, Copy, Default)]
pub struct QrSolver;

impl LeastSquares for QrSolver {
    fn solve(&self, design: &DMatrix<f64>, target: &DVector<f64>) -> Result<DVector<f64>, SolveError> {
        check_shape(design, target)?;
        let qr = design.clone().qr();
        let r = qr.r();
        let scale = r.diagonal().amax().max(1.0);
        if r.diagonal().iter().any(|d| d.abs() <= 1e-12 * scale) {
            return Err(SolveError::Singular);
        }
        let qt_b = qr.q().tr_mul(target);
        r.solve_upper_triangular(&qt_b).ok_or(SolveError::Singular)
    }
}

/// Truncated SVD, tolerant of near-rank-deficient systems
#[derive(Debug, Clone, Copy)]
pub struct SvdSolver {
    pub epsilon: f64,
}

impl Default for SvdSolver {
    fn default() -> Self {
        Self { epsilon: 1e-10 }
    }
}

impl LeastSquares for SvdSolver {
    fn solve(&self, design: &DMatrix<f64>, target: &DVector<f64>) -> Result<DVector<f64>, SolveError> {
        check_shape(design, target)?;
        let svd = design.clone().svd(true, true);
        let largest = svd.singular_values.max();
        if largest <= 0.0 || svd.singular_values.min() <= self.epsilon * largest {
            return Err(SolveError::Singular);
        }
        svd.solve(target, self.epsilon).map_err(|_| SolveError::Singular)
    }
}

/// Column-major design matrix built element by element, failing cleanly
/// when the allocation cannot be satisfied.
pub fn try_matrix<F>(rows: usize, cols: usize, stage: Stage, mut fill: F) -> CalibrationResult<DMatrix<f64>>
where
    F: FnMut(usize, usize) -> f64,
{
    let requested = rows
        .checked_mul(cols)
        .ok_or(CalibrationError::ResourceExhaustion { stage, requested: usize::MAX })?;
    let mut data = Vec::new();
    data.try_reserve_exact(requested)
        .map_err(|_| CalibrationError::ResourceExhaustion { stage, requested })?;
    for c in 0..cols {
        for r in 0..rows {
            data.push(fill(r, c));
        }
    }
    Ok(DMatrix::from_vec(rows, cols, data))
}

pub fn try_vector<F>(len: usize, stage: Stage, fill: F) -> CalibrationResult<DVector<f64>>
where
    F: FnMut(usize) -> f64,
{
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| CalibrationError::ResourceExhaustion { stage, requested: len })?;
    data.extend((0..len).map(fill));
    Ok(DVector::from_vec(data))
}
