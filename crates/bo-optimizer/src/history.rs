//! Observation history and run lifecycle tracking.

use bo_types::ParameterSet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// One evaluated point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    /// Position in the history, 0-based.
    pub step: usize,
    pub parameters: ParameterSet,
    /// `parameters` flattened in search-space order.
    pub point: Vec<f64>,
    pub value: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Observation {
    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }
}

/// Running maximum of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub parameters: ParameterSet,
    pub value: f64,
    pub step: usize,
}

/// Append-only list of observations plus the best one seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationHistory {
    observations: Vec<Observation>,
    best: Option<BestResult>,
}

impl ObservationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation. Returns true when it strictly beats the best.
    pub fn record(&mut self, observation: Observation) -> bool {
        let improved = match &self.best {
            None => true,
            Some(current) => observation.value > current.value,
        };
        if improved {
            self.best = Some(BestResult {
                parameters: observation.parameters.clone(),
                value: observation.value,
                step: observation.step,
            });
        }
        self.observations.push(observation);
        improved
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn best(&self) -> Option<&BestResult> {
        self.best.as_ref()
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.value)
    }

    pub fn points(&self) -> Vec<Vec<f64>> {
        self.observations.iter().map(|o| o.point.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.best = None;
    }
}

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Status of a single `optimize` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub state: RunState,
    pub steps_requested: usize,
    pub steps_completed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(steps_requested: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            steps_requested,
            steps_completed: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.state = RunState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Summary returned by a finished `optimize` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub run_id: RunId,
    pub state: RunState,
    pub steps_requested: usize,
    pub steps_completed: usize,
    /// Observations held by the optimizer, including earlier runs and seeds.
    pub total_observations: usize,
    pub best: Option<BestResult>,
    pub seed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OptimizationReport {
    pub fn best_params(&self) -> Option<&ParameterSet> {
        self.best.as_ref().map(|b| &b.parameters)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.value)
    }
}
