//! # bo-optimizer
//!
//! Bayesian optimization of expensive black-box objectives.
//!
//! Each step draws random candidates from the search space, scores them with
//! a mean-only improvement rule against a Gaussian-process surrogate, awaits
//! the objective on the winner, and refits the surrogate on the full history.

mod acquisition;
mod config;
mod history;
mod objective;
mod optimizer;

pub use acquisition::{select_best, ExpectedImprovement};
pub use config::OptimizerConfig;
pub use history::{
    BestResult, Observation, ObservationHistory, OptimizationReport, RunId, RunState, RunStatus,
};
pub use objective::{CancellationFlag, FnObjective, Objective, SyncObjective};
pub use optimizer::BayesianOptimizer;

pub use bo_types::{BoError, BoResult, ParameterRange, ParameterSet, SearchSpace};
