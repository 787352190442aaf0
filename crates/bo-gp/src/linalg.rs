//! Dense covariance matrices and their Cholesky factorization.

use bo_types::{BoResult, ModelError};
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

/// Dense matrix of kernel evaluations.
pub type CovarianceMatrix = DMatrix<f64>;

/// Lower-triangular factor `L` of `A = L * L^T`.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    inner: Cholesky<f64, Dyn>,
}

impl CholeskyFactor {
    /// Factorize a symmetric positive-definite matrix.
    ///
    /// A non-positive (or NaN) residual on the diagonal means the matrix is
    /// not numerically positive definite and yields
    /// [`ModelError::NumericalInstability`] naming the first failing row.
    pub fn decompose(matrix: &CovarianceMatrix) -> BoResult<Self> {
        if !matrix.is_square() {
            return Err(ModelError::InconsistentDimensions {
                index: 0,
                expected: matrix.nrows(),
                found: matrix.ncols(),
            }
            .into());
        }

        match Cholesky::new(matrix.clone()) {
            Some(inner) => Ok(Self { inner }),
            None => {
                let (row, pivot) = locate_breakdown(matrix);
                Err(ModelError::NumericalInstability { row, pivot }.into())
            }
        }
    }

    /// Solve `A * x = b` with a forward then a back substitution.
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        self.inner.solve(b)
    }
}

/// Find the first leading block that stops being positive definite and the
/// residual pivot it would have needed.
fn locate_breakdown(matrix: &CovarianceMatrix) -> (usize, f64) {
    let mut previous: Option<Cholesky<f64, Dyn>> = None;

    for row in 0..matrix.nrows() {
        let leading = matrix.view((0, 0), (row + 1, row + 1)).clone_owned();
        if let Some(factor) = Cholesky::new(leading) {
            previous = Some(factor);
            continue;
        }

        let diagonal = matrix[(row, row)];
        let pivot = match &previous {
            Some(factor) => {
                let column = matrix.view((0, row), (row, 1)).clone_owned();
                factor
                    .l()
                    .solve_lower_triangular(&column)
                    .map_or(f64::NAN, |z| diagonal - z.norm_squared())
            }
            None => diagonal,
        };
        return (row, pivot);
    }

    (matrix.nrows().saturating_sub(1), f64::NAN)
}
