//! Optimizer configuration.

use bo_gp::DEFAULT_JITTER;
use bo_types::{config_error, BoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for a [`crate::BayesianOptimizer`].
///
/// Every field has a default, so a JSON file only needs the keys it wants
/// to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Matérn smoothness order. Only 0.5, 1.5 and 2.5 are usable; anything
    /// else fails the first time the kernel is evaluated.
    pub kernel_nu: f64,

    /// Kernel length-scale, strictly positive.
    pub length_scale: f64,

    /// Random candidates scored per step.
    pub num_candidates: usize,

    /// Margin subtracted in the improvement score.
    pub exploration: f64,

    /// Nugget added to the covariance diagonal before factorization. Off by
    /// default.
    pub jitter: f64,

    /// RNG seed. `None` draws a fresh seed per optimizer.
    pub seed: Option<u64>,

    /// Score candidates on the rayon pool.
    pub parallel_scoring: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kernel_nu: 1.5,
            length_scale: 1.0,
            num_candidates: 100,
            exploration: 0.01,
            jitter: DEFAULT_JITTER,
            seed: None,
            parallel_scoring: false,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, nu: f64, length_scale: f64) -> Self {
        self.kernel_nu = nu;
        self.length_scale = length_scale;
        self
    }

    pub fn with_num_candidates(mut self, n: usize) -> Self {
        self.num_candidates = n;
        self
    }

    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallel_scoring(mut self, enabled: bool) -> Self {
        self.parallel_scoring = enabled;
        self
    }

    pub fn validate(&self) -> BoResult<()> {
        if !(self.length_scale.is_finite() && self.length_scale > 0.0) {
            return Err(config_error!(
                "length_scale must be positive and finite, got {}",
                self.length_scale
            ));
        }
        if self.num_candidates == 0 {
            return Err(config_error!("num_candidates must be at least 1"));
        }
        if !self.exploration.is_finite() {
            return Err(config_error!("exploration must be finite, got {}", self.exploration));
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(config_error!(
                "jitter must be non-negative and finite, got {}",
                self.jitter
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> BoResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> BoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
