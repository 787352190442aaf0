use thiserror::Error;

/// Fixed message reported for an unsupported Matérn smoothness order.
pub const UNSUPPORTED_NU_MESSAGE: &str =
    "Unsupported value for nu. Only 0.5, 1.5, and 2.5 are supported.";

/// Main error type for the optimizer workspace
#[derive(Error, Debug)]
pub enum BoError {
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Error raised by a user-supplied objective, passed through untouched.
    #[error(transparent)]
    Objective(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Covariance-kernel errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Unsupported value for nu. Only 0.5, 1.5, and 2.5 are supported.")]
    UnsupportedParameter { nu: f64 },

    #[error("Point {index} has no coordinates")]
    EmptyPoint { index: usize },
}

/// Gaussian-process model errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Covariance matrix is not positive definite: pivot {pivot} at row {row}")]
    NumericalInstability { row: usize, pivot: f64 },

    #[error("Observation count mismatch: {points} points but {values} values")]
    DimensionMismatch { points: usize, values: usize },

    #[error("Point {index} has {found} coordinates, expected {expected}")]
    InconsistentDimensions {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Model has no observations to predict from")]
    EmptyModel,
}

impl BoError {
    /// Wrap an objective failure without altering its message.
    pub fn objective(error: impl Into<anyhow::Error>) -> Self {
        Self::Objective(error.into())
    }

    /// True when the error came from the user-supplied objective.
    pub fn is_objective(&self) -> bool {
        matches!(self, Self::Objective(_))
    }
}

/// Result type alias for optimizer operations
pub type BoResult<T> = Result<T, BoError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BoError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BoError::Config(format!($($arg)*))
    };
}
