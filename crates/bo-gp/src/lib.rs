//! # bo-gp
//!
//! Gaussian-process surrogate for the Bayesian optimizer: Matérn kernels,
//! nalgebra-backed Cholesky solves, and a posterior-mean regressor.

pub mod gp;
pub mod kernel;
pub mod linalg;

pub use gp::{GaussianProcessRegressor, DEFAULT_JITTER};
pub use kernel::{Kernel, MaternKernel, MaternOrder};
pub use linalg::{CholeskyFactor, CovarianceMatrix};
