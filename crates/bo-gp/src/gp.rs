//! Gaussian process regression (posterior mean only).

use bo_types::{BoResult, ModelError};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::kernel::{Kernel, MaternKernel};
use crate::linalg::{CholeskyFactor, CovarianceMatrix};

/// Default nugget added to the covariance diagonal before factorization.
///
/// Zero: the raw kernel matrix is factorized, so duplicate observations
/// surface as [`ModelError::NumericalInstability`]. A small positive value
/// such as `1e-6` regularizes near-singular designs.
pub const DEFAULT_JITTER: f64 = 0.0;

/// Zero-mean GP regressor.
///
/// `fit` stores the observations, builds the self-covariance `K`, factorizes
/// `K + jitter * I = L * L^T` and caches `alpha = K^-1 y` (forward then back
/// substitution). `predict` evaluates `Ks^T * alpha`, so repeated calls on
/// the same fit are identical and never touch the model.
///
/// Every `fit` rebuilds and refactorizes from scratch: O(n^3) per call.
#[derive(Debug, Clone)]
pub struct GaussianProcessRegressor<K: Kernel = MaternKernel> {
    kernel: K,
    jitter: f64,
    x_train: Vec<Vec<f64>>,
    y_train: Vec<f64>,
    covariance: Option<CovarianceMatrix>,
    alpha: DVector<f64>,
}

impl<K: Kernel> GaussianProcessRegressor<K> {
    pub fn new(kernel: K) -> Self {
        Self::with_jitter(kernel, DEFAULT_JITTER)
    }

    /// `jitter = 0.0` factorizes the raw kernel matrix.
    pub fn with_jitter(kernel: K, jitter: f64) -> Self {
        Self {
            kernel,
            jitter,
            x_train: Vec::new(),
            y_train: Vec::new(),
            covariance: None,
            alpha: DVector::zeros(0),
        }
    }

    /// Replace the observation set and refit.
    ///
    /// On error the previous fit is left untouched.
    pub fn fit(&mut self, x: Vec<Vec<f64>>, y: Vec<f64>) -> BoResult<()> {
        if x.len() != y.len() {
            return Err(ModelError::DimensionMismatch {
                points: x.len(),
                values: y.len(),
            }
            .into());
        }
        check_dimensions(&x, x.first().map_or(0, Vec::len))?;

        if x.is_empty() {
            self.clear();
            return Ok(());
        }

        let n = x.len();
        let covariance = self.kernel.covariance_matrix(&x, None)?;
        let regularized = &covariance + DMatrix::<f64>::identity(n, n) * self.jitter;
        let factor = CholeskyFactor::decompose(&regularized)?;
        let alpha = factor.solve(&DVector::from_column_slice(&y));

        debug!(observations = x.len(), jitter = self.jitter, "gaussian process fitted");

        self.x_train = x;
        self.y_train = y;
        self.covariance = Some(covariance);
        self.alpha = alpha;
        Ok(())
    }

    /// Posterior mean at each query point.
    pub fn predict(&self, queries: &[Vec<f64>]) -> BoResult<Vec<f64>> {
        if self.x_train.is_empty() {
            return Err(ModelError::EmptyModel.into());
        }
        check_dimensions(queries, self.dimensions())?;

        let cross = self.kernel.covariance_matrix(&self.x_train, Some(queries))?;
        // Column j of `cross` dotted with alpha, one query at a time.
        Ok(cross.tr_mul(&self.alpha).iter().copied().collect())
    }

    /// Posterior mean at a single point.
    ///
    /// Bitwise equal to the matching entry of a batch [`predict`](Self::predict).
    pub fn predict_one(&self, query: &[f64]) -> BoResult<f64> {
        let means = self.predict(&[query.to_vec()])?;
        Ok(means[0])
    }

    pub fn clear(&mut self) {
        self.x_train.clear();
        self.y_train.clear();
        self.covariance = None;
        self.alpha = DVector::zeros(0);
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn len(&self) -> usize {
        self.x_train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_train.is_empty()
    }

    /// Coordinates per training point (0 when unfitted).
    pub fn dimensions(&self) -> usize {
        self.x_train.first().map_or(0, Vec::len)
    }

    pub fn points(&self) -> &[Vec<f64>] {
        &self.x_train
    }

    pub fn values(&self) -> &[f64] {
        &self.y_train
    }

    /// Kernel self-covariance of the training points, without jitter.
    pub fn covariance(&self) -> Option<&CovarianceMatrix> {
        self.covariance.as_ref()
    }

    /// `K^-1 y` for the current fit.
    pub fn alpha(&self) -> &[f64] {
        self.alpha.as_slice()
    }
}

impl Default for GaussianProcessRegressor<MaternKernel> {
    fn default() -> Self {
        Self::new(MaternKernel::default())
    }
}

fn check_dimensions(points: &[Vec<f64>], expected: usize) -> BoResult<()> {
    match points.iter().position(|p| p.len() != expected) {
        Some(index) => Err(ModelError::InconsistentDimensions {
            index,
            expected,
            found: points[index].len(),
        }
        .into()),
        None => Ok(()),
    }
}
