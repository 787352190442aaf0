//! Covariance kernels.

use bo_types::{BoResult, KernelError};
use serde::{Deserialize, Serialize};

use crate::linalg::CovarianceMatrix;

/// A covariance function over points.
pub trait Kernel: Send + Sync {
    /// Covariance between two single points.
    fn covariance(&self, a: &[f64], b: &[f64]) -> BoResult<f64>;

    /// Covariance matrix between two point sets, `|a| x |b|`.
    ///
    /// With `b = None` this is the symmetric self-covariance of `a`.
    fn covariance_matrix(&self, a: &[Vec<f64>], b: Option<&[Vec<f64>]>) -> BoResult<CovarianceMatrix> {
        check_points(a)?;
        match b {
            None => {
                let n = a.len();
                let mut matrix = CovarianceMatrix::zeros(n, n);
                for i in 0..n {
                    for j in i..n {
                        let value = self.covariance(&a[i], &a[j])?;
                        matrix[(i, j)] = value;
                        matrix[(j, i)] = value;
                    }
                }
                Ok(matrix)
            }
            Some(b) => {
                check_points(b)?;
                let mut matrix = CovarianceMatrix::zeros(a.len(), b.len());
                for (i, pa) in a.iter().enumerate() {
                    for (j, pb) in b.iter().enumerate() {
                        matrix[(i, j)] = self.covariance(pa, pb)?;
                    }
                }
                Ok(matrix)
            }
        }
    }
}

fn check_points(points: &[Vec<f64>]) -> BoResult<()> {
    match points.iter().position(|p| p.is_empty()) {
        Some(index) => Err(KernelError::EmptyPoint { index }.into()),
        None => Ok(()),
    }
}

/// Supported Matérn smoothness orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaternOrder {
    /// ν = 0.5, the exponential kernel.
    Half,
    /// ν = 1.5
    ThreeHalves,
    /// ν = 2.5
    FiveHalves,
}

impl MaternOrder {
    /// Exact match only; 1.5000001 is not 1.5.
    pub fn from_nu(nu: f64) -> Option<Self> {
        if nu == 0.5 {
            Some(Self::Half)
        } else if nu == 1.5 {
            Some(Self::ThreeHalves)
        } else if nu == 2.5 {
            Some(Self::FiveHalves)
        } else {
            None
        }
    }

    pub fn nu(self) -> f64 {
        match self {
            Self::Half => 0.5,
            Self::ThreeHalves => 1.5,
            Self::FiveHalves => 2.5,
        }
    }
}

/// Matérn covariance with smoothness `nu` and a length-scale.
///
/// Distance is measured on the FIRST coordinate of each point only; any
/// further coordinates are ignored. Multi-dimensional points are accepted
/// but behave as their projection onto the first axis.
///
/// `nu` is checked when covariance is computed, not at construction, so an
/// unsupported order surfaces as [`KernelError::UnsupportedParameter`] from
/// the first call that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaternKernel {
    nu: f64,
    length_scale: f64,
}

impl MaternKernel {
    pub fn new(nu: f64, length_scale: f64) -> Self {
        Self { nu, length_scale }
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn order(&self) -> BoResult<MaternOrder> {
        MaternOrder::from_nu(self.nu).ok_or_else(|| KernelError::UnsupportedParameter { nu: self.nu }.into())
    }

    /// Scalar Matérn covariance between two coordinates.
    pub fn evaluate(&self, x1: f64, x2: f64) -> BoResult<f64> {
        let order = self.order()?;
        let d = (2.0 * self.nu).sqrt() * (x1 - x2).abs() / self.length_scale;

        let value = match order {
            MaternOrder::Half => (-d).exp(),
            MaternOrder::ThreeHalves => (1.0 + d) * (-d).exp(),
            MaternOrder::FiveHalves => (1.0 + d + d * d / 3.0) * (-d).exp(),
        };
        Ok(value)
    }
}

impl Default for MaternKernel {
    fn default() -> Self {
        Self::new(1.5, 1.0)
    }
}

impl Kernel for MaternKernel {
    fn covariance(&self, a: &[f64], b: &[f64]) -> BoResult<f64> {
        let (Some(x1), Some(x2)) = (a.first(), b.first()) else {
            return Err(KernelError::EmptyPoint { index: 0 }.into());
        };
        self.evaluate(*x1, *x2)
    }
}
