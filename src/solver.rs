use std::time::Instant;

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};

/// Relative residual above which a solution is rejected.
pub const DEFAULT_RESIDUAL_TOLERANCE: f64 = 0.1;

/// Residual above which a factorization result is retried as an SVD
/// least-squares solve.
pub const LEAST_SQUARES_THRESHOLD: f64 = 1e-9;

/// Solver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Upper bound on ‖A·x − b‖ / ‖b‖ for a solve to count as valid.
    pub residual_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::ColPivQr,
            residual_tolerance: DEFAULT_RESIDUAL_TOLERANCE,
        }
    }
}

/// Available dense factorizations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Householder QR with column pivoting
    ColPivQr,
    /// Householder QR
    Qr,
    /// LU decomposition with partial pivoting
    Lu,
}

/// Solver statistics
#[derive(Debug, Clone, Serialize)]
pub struct SolverStats {
    pub method_used: SolverMethod,
    pub size: usize,
    /// Relative residual ‖A·x − b‖ / ‖b‖ (absolute when b = 0).
    pub residual: f64,
    /// True when the system was rank deficient and solved in the least-squares sense.
    pub least_squares: bool,
    pub solve_time: f64,
}

/// Dense linear system solver
#[derive(Debug, Clone, Default)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        LinearSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve A·x = b and validate the result against the residual tolerance.
    ///
    /// A rejected solve returns [`CircuitError::InvalidCircuit`]; the caller
    /// never sees a partial solution.
    pub fn solve(&self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<(DVector<f64>, SolverStats)> {
        let start_time = Instant::now();
        let size = matrix.nrows();

        if matrix.ncols() != size || rhs.len() != size {
            return Err(CircuitError::DecompositionFailed);
        }

        let mut solution = if size == 0 {
            Some(DVector::zeros(0))
        } else {
            self.factorize_and_solve(matrix, rhs)
        };
        let mut residual = solution
            .as_ref()
            .map_or(f64::INFINITY, |x| relative_residual(matrix, rhs, x));

        // A singular system (equal parallel sources, equal series current
        // sources) can still be consistent; the residual gate below decides.
        let mut least_squares = false;
        if !(residual <= LEAST_SQUARES_THRESHOLD) {
            if let Some(x) = least_squares_solve(matrix, rhs) {
                let candidate = relative_residual(matrix, rhs, &x);
                debug!(
                    "{:?} residual {:.3e}, retried as SVD least squares: {:.3e}",
                    self.config.method, residual, candidate
                );
                solution = Some(x);
                residual = candidate;
                least_squares = true;
            }
        }
        let solution = solution.ok_or(CircuitError::DecompositionFailed)?;

        let stats = SolverStats {
            method_used: self.config.method,
            size,
            residual,
            least_squares,
            solve_time: start_time.elapsed().as_secs_f64(),
        };
        debug!(
            "{:?} solve of {}x{} system: residual {:.3e} in {:.3}ms",
            stats.method_used,
            size,
            size,
            residual,
            stats.solve_time * 1000.0
        );

        // NaN must fail too
        if !(residual <= self.config.residual_tolerance) {
            return Err(CircuitError::InvalidCircuit { residual });
        }

        Ok((solution, stats))
    }

    fn factorize_and_solve(&self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
        match self.config.method {
            SolverMethod::ColPivQr => matrix.clone().col_piv_qr().solve(rhs),
            SolverMethod::Qr => matrix.clone().qr().solve(rhs),
            SolverMethod::Lu => matrix.clone().lu().solve(rhs),
        }
    }
}

/// Minimum-norm least-squares solution; singular values below the rank
/// tolerance are treated as zero.
fn least_squares_solve(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = matrix.clone().svd(true, true);
    let eps = svd.singular_values.max() * f64::EPSILON * matrix.nrows() as f64;
    svd.solve(rhs, eps).ok()
}

/// ‖A·x − b‖ / ‖b‖, falling back to the absolute residual when b = 0.
pub fn relative_residual(matrix: &DMatrix<f64>, rhs: &DVector<f64>, solution: &DVector<f64>) -> f64 {
    let residual = (matrix * solution - rhs).norm();
    let scale = rhs.norm();
    if scale > 0.0 {
        residual / scale
    } else {
        residual
    }
}
