//! The Bayesian optimization loop.

use bo_gp::{GaussianProcessRegressor, MaternKernel};
use bo_types::{validation_error, BoError, BoResult, ParameterSet, SearchSpace};
use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acquisition::{select_best, ExpectedImprovement};
use crate::config::OptimizerConfig;
use crate::history::{
    BestResult, Observation, ObservationHistory, OptimizationReport, RunState, RunStatus,
};
use crate::objective::{CancellationFlag, Objective};

/// Sequential GP-driven optimizer that maximizes an [`Objective`].
///
/// Each instance owns its RNG, model and history; nothing is shared between
/// instances, so independent optimizers can run on separate tasks.
///
/// Observations accumulate across `optimize` and `tell` calls until
/// [`reset`](Self::reset), and must all come from the same search space.
#[derive(Debug)]
pub struct BayesianOptimizer {
    config: OptimizerConfig,
    acquisition: ExpectedImprovement,
    gp: GaussianProcessRegressor<MaternKernel>,
    rng: ChaCha8Rng,
    seed: u64,
    history: ObservationHistory,
    space: Option<SearchSpace>,
    cancel: CancellationFlag,
    last_run: Option<RunStatus>,
}

impl BayesianOptimizer {
    /// Create an optimizer after validating `config`.
    pub fn new(config: OptimizerConfig) -> BoResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: OptimizerConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let kernel = MaternKernel::new(config.kernel_nu, config.length_scale);

        Self {
            acquisition: ExpectedImprovement::new(config.exploration),
            gp: GaussianProcessRegressor::with_jitter(kernel, config.jitter),
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            history: ObservationHistory::new(),
            space: None,
            cancel: CancellationFlag::new(),
            last_run: None,
            config,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Seed actually used by the RNG, for replaying a run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Handle that stops `optimize` before its next iteration.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn observations(&self) -> &[Observation] {
        self.history.observations()
    }

    pub fn best(&self) -> Option<&BestResult> {
        self.history.best()
    }

    /// Best parameters so far; `None` until something has been evaluated.
    pub fn best_params(&self) -> Option<&ParameterSet> {
        self.history.best().map(|b| &b.parameters)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.history.best_value()
    }

    pub fn last_run(&self) -> Option<&RunStatus> {
        self.last_run.as_ref()
    }

    pub fn model(&self) -> &GaussianProcessRegressor<MaternKernel> {
        &self.gp
    }

    /// Drop all observations and the model. The RNG stream continues.
    pub fn reset(&mut self) {
        self.history.clear();
        self.gp.clear();
        self.space = None;
        self.last_run = None;
    }

    /// Pick the next point to evaluate without evaluating it.
    pub fn suggest(&mut self, space: &SearchSpace) -> BoResult<ParameterSet> {
        self.bind_space(space)?;
        self.select_candidate(space)
    }

    /// Record an externally evaluated point and refit the model.
    ///
    /// Returns true when `value` is a new best.
    pub fn tell(&mut self, space: &SearchSpace, params: ParameterSet, value: f64) -> BoResult<bool> {
        self.bind_space(space)?;
        if !value.is_finite() {
            return Err(validation_error!("observed value must be finite, got {value}"));
        }
        let point = space.to_point(&params)?;
        // Store the parameters in space order.
        let params = space.to_parameters(&point)?;
        let now = Utc::now();
        self.record(params, point, value, now)
    }

    /// Run `num_steps` evaluate-and-refit iterations against `objective`.
    ///
    /// Any error aborts the run; observations completed before it stay in
    /// the history. Cancellation is not an error: the report comes back with
    /// [`RunState::Cancelled`].
    pub async fn optimize<O>(
        &mut self,
        objective: &O,
        space: &SearchSpace,
        num_steps: usize,
    ) -> BoResult<OptimizationReport>
    where
        O: Objective + ?Sized,
    {
        if num_steps == 0 {
            return Err(validation_error!("num_steps must be at least 1"));
        }
        self.bind_space(space)?;

        let mut status = RunStatus::new(num_steps);
        status.mark_running();

        info!(
            run_id = %status.id,
            steps = num_steps,
            dimensions = space.dimensions(),
            prior_observations = self.history.len(),
            seed = self.seed,
            "bayesian optimization started"
        );

        if let Err(e) = self.run_steps(objective, space, &mut status).await {
            warn!(
                run_id = %status.id,
                steps_completed = status.steps_completed,
                error = %e,
                "bayesian optimization failed"
            );
            status.mark_failed(e.to_string());
            self.last_run = Some(status);
            return Err(e);
        }

        if status.state != RunState::Cancelled {
            status.mark_completed();
        }

        info!(
            run_id = %status.id,
            state = ?status.state,
            steps_completed = status.steps_completed,
            best_value = ?self.best_value(),
            best_params = %self.best_params().map(ToString::to_string).unwrap_or_default(),
            "bayesian optimization finished"
        );

        let report = OptimizationReport {
            run_id: status.id,
            state: status.state,
            steps_requested: status.steps_requested,
            steps_completed: status.steps_completed,
            total_observations: self.history.len(),
            best: self.history.best().cloned(),
            seed: self.seed,
            started_at: status.started_at,
            finished_at: status.finished_at,
        };
        self.last_run = Some(status);
        Ok(report)
    }

    async fn run_steps<O>(
        &mut self,
        objective: &O,
        space: &SearchSpace,
        status: &mut RunStatus,
    ) -> BoResult<()>
    where
        O: Objective + ?Sized,
    {
        for step in 0..status.steps_requested {
            if self.cancel.is_cancelled() {
                warn!(run_id = %status.id, step, "bayesian optimization cancelled");
                status.mark_cancelled();
                return Ok(());
            }

            let params = self.select_candidate(space)?;
            let started_at = Utc::now();
            let value = objective
                .evaluate(&params)
                .await
                .map_err(BoError::Objective)?;
            if !value.is_finite() {
                return Err(BoError::objective(anyhow::anyhow!(
                    "objective returned non-finite value {value} for {params}"
                )));
            }

            let point = params.values();
            let improved = self.record(params, point, value, started_at)?;
            status.steps_completed += 1;

            debug!(
                run_id = %status.id,
                step,
                value,
                improved,
                best_value = ?self.best_value(),
                "step completed"
            );
        }
        Ok(())
    }

    /// Pin the search space the history belongs to.
    fn bind_space(&mut self, space: &SearchSpace) -> BoResult<()> {
        space.validate()?;
        match &self.space {
            Some(existing) if existing != space && !self.history.is_empty() => {
                Err(validation_error!(
                    "optimizer holds {} observations from a different search space; call reset() first",
                    self.history.len()
                ))
            }
            _ => {
                self.space = Some(space.clone());
                Ok(())
            }
        }
    }

    /// Append an observation, update the best, and refit the GP on the
    /// whole history.
    fn record(
        &mut self,
        parameters: ParameterSet,
        point: Vec<f64>,
        value: f64,
        started_at: chrono::DateTime<Utc>,
    ) -> BoResult<bool> {
        let observation = Observation {
            id: Uuid::new_v4(),
            step: self.history.len(),
            parameters,
            point,
            value,
            started_at,
            finished_at: Utc::now(),
        };
        let improved = self.history.record(observation);
        self.refit()?;
        Ok(improved)
    }

    fn refit(&mut self) -> BoResult<()> {
        self.gp.fit(self.history.points(), self.history.values())
    }

    /// Draw `num_candidates` uniform points and keep the best-scoring one.
    fn select_candidate(&mut self, space: &SearchSpace) -> BoResult<ParameterSet> {
        let mut candidates = (0..self.config.num_candidates)
            .map(|_| space.sample(&mut self.rng))
            .collect::<BoResult<Vec<ParameterSet>>>()?;

        let scores = self.score_candidates(&candidates)?;
        let index = match select_best(&scores) {
            Some(index) => index,
            None => {
                warn!("no candidate produced a usable score, taking the first");
                0
            }
        };
        Ok(candidates.swap_remove(index))
    }

    fn score_candidates(&mut self, candidates: &[ParameterSet]) -> BoResult<Vec<f64>> {
        let Some(best) = self.history.best_value() else {
            return Ok(vec![f64::INFINITY; candidates.len()]);
        };

        // A previous refit may have failed after its observation was stored.
        if self.gp.len() != self.history.len() {
            self.refit()?;
        }

        let points: Vec<Vec<f64>> = candidates.iter().map(ParameterSet::values).collect();
        let means = if self.config.parallel_scoring {
            let gp = &self.gp;
            points
                .par_iter()
                .map(|p| gp.predict_one(p))
                .collect::<BoResult<Vec<f64>>>()?
        } else {
            self.gp.predict(&points)?
        };

        Ok(means
            .into_iter()
            .map(|mean| self.acquisition.score(mean, Some(best)))
            .collect())
    }
}

impl Default for BayesianOptimizer {
    fn default() -> Self {
        Self::build(OptimizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{FnObjective, SyncObjective};
    use bo_types::{KernelError, ModelError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quadratic_space() -> SearchSpace {
        SearchSpace::new().add_range("x", -10.0, 10.0)
    }

    fn quadratic(params: &ParameterSet) -> anyhow::Result<f64> {
        let x = params
            .get("x")
            .ok_or_else(|| anyhow::anyhow!("missing parameter x"))?;
        Ok(-(x - 3.0).powi(2))
    }

    fn seeded(seed: u64) -> BayesianOptimizer {
        BayesianOptimizer::new(OptimizerConfig::new().with_seed(seed)).unwrap()
    }

    #[tokio::test]
    async fn converges_on_concave_objective() {
        let mut optimizer = seeded(42);
        let objective = SyncObjective::new(quadratic);

        let report = optimizer
            .optimize(&objective, &quadratic_space(), 150)
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Completed);
        let x = optimizer.best_params().unwrap().get("x").unwrap();
        assert!((x - 3.0).abs() <= 0.5, "best x = {x}");
        assert_eq!(report.best_value(), optimizer.best_value());
    }

    #[tokio::test]
    async fn observation_count_matches_step_budget() {
        let mut optimizer = seeded(1);
        let objective = SyncObjective::new(quadratic);

        let report = optimizer.optimize(&objective, &quadratic_space(), 25).await.unwrap();
        assert_eq!(report.steps_completed, 25);
        assert_eq!(optimizer.observations().len(), 25);
        for (i, obs) in optimizer.observations().iter().enumerate() {
            assert_eq!(obs.step, i);
            assert!((-10.0..=10.0).contains(&obs.point[0]));
        }
        assert_eq!(optimizer.model().len(), 25);
    }

    #[tokio::test]
    async fn explicit_seed_observation_adds_one() {
        let space = quadratic_space();
        let mut optimizer = seeded(2);
        let objective = SyncObjective::new(quadratic);

        let seed_params = ParameterSet::new().with("x", 0.0);
        assert!(optimizer.tell(&space, seed_params, -9.0).unwrap());

        let report = optimizer.optimize(&objective, &space, 10).await.unwrap();
        assert_eq!(report.total_observations, 11);
        assert_eq!(optimizer.observations()[0].value, -9.0);
    }

    #[tokio::test]
    async fn best_params_absent_until_first_evaluation() {
        let mut optimizer = seeded(3);
        assert!(optimizer.best_params().is_none());
        assert!(optimizer.best_value().is_none());

        let objective = SyncObjective::new(quadratic);
        optimizer.optimize(&objective, &quadratic_space(), 1).await.unwrap();
        assert!(optimizer.best_params().is_some());
    }

    #[tokio::test]
    async fn best_is_running_maximum_of_history() {
        let mut optimizer = seeded(4);
        let objective = SyncObjective::new(quadratic);
        optimizer.optimize(&objective, &quadratic_space(), 30).await.unwrap();

        let max = optimizer
            .observations()
            .iter()
            .map(|o| o.value)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(optimizer.best_value(), Some(max));
    }

    #[tokio::test]
    async fn same_seed_replays_identically() {
        let objective = SyncObjective::new(quadratic);
        let mut a = seeded(99);
        let mut b = seeded(99);
        a.optimize(&objective, &quadratic_space(), 15).await.unwrap();
        b.optimize(&objective, &quadratic_space(), 15).await.unwrap();

        let points_a: Vec<_> = a.observations().iter().map(|o| o.point.clone()).collect();
        let points_b: Vec<_> = b.observations().iter().map(|o| o.point.clone()).collect();
        assert_eq!(points_a, points_b);
        assert_eq!(a.seed(), 99);
    }

    #[tokio::test]
    async fn parallel_scoring_matches_serial() {
        let objective = SyncObjective::new(quadratic);
        let mut serial = seeded(5);
        let mut parallel =
            BayesianOptimizer::new(OptimizerConfig::new().with_seed(5).with_parallel_scoring(true))
                .unwrap();

        serial.optimize(&objective, &quadratic_space(), 20).await.unwrap();
        parallel.optimize(&objective, &quadratic_space(), 20).await.unwrap();

        let a: Vec<_> = serial.observations().iter().map(|o| o.point.clone()).collect();
        let b: Vec<_> = parallel.observations().iter().map(|o| o.point.clone()).collect();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn objective_error_aborts_and_keeps_progress() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let objective = SyncObjective::new(move |params: &ParameterSet| {
            if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                anyhow::bail!("simulator crashed");
            }
            quadratic(params)
        });

        let mut optimizer = seeded(6);
        let err = optimizer
            .optimize(&objective, &quadratic_space(), 10)
            .await
            .unwrap_err();

        assert!(err.is_objective());
        assert_eq!(err.to_string(), "simulator crashed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(optimizer.observations().len(), 2);
        assert!(optimizer.best_params().is_some());

        let status = optimizer.last_run().unwrap();
        assert_eq!(status.state, RunState::Failed);
        assert_eq!(status.steps_completed, 2);
    }

    #[tokio::test]
    async fn non_finite_objective_value_aborts() {
        let objective = SyncObjective::new(|_: &ParameterSet| Ok(f64::NAN));
        let mut optimizer = seeded(7);
        let err = optimizer
            .optimize(&objective, &quadratic_space(), 3)
            .await
            .unwrap_err();
        assert!(err.is_objective());
        assert!(optimizer.observations().is_empty());
    }

    #[tokio::test]
    async fn unsupported_kernel_order_aborts_after_first_fit() {
        let config = OptimizerConfig::new().with_kernel(3.0, 1.0).with_seed(8);
        let mut optimizer = BayesianOptimizer::new(config).unwrap();
        let objective = SyncObjective::new(quadratic);

        let err = optimizer
            .optimize(&objective, &quadratic_space(), 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BoError::Kernel(KernelError::UnsupportedParameter { .. })
        ));
        // The seed point was evaluated before the model was needed.
        assert_eq!(optimizer.observations().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_points_abort_with_default_config() {
        // A zero-width range forces duplicate points; the default config
        // factorizes the raw kernel matrix, so the second fit breaks down.
        let space = SearchSpace::new().add_range("x", 1.0, 1.0);
        let mut optimizer = seeded(10);
        assert_eq!(optimizer.config().jitter, 0.0);
        let objective = SyncObjective::new(|_: &ParameterSet| Ok(0.5));

        let err = optimizer.optimize(&objective, &space, 5).await.unwrap_err();
        assert!(matches!(
            err,
            BoError::Model(ModelError::NumericalInstability { row: 1, .. })
        ));
        assert_eq!(optimizer.observations().len(), 2);
        assert_eq!(optimizer.best_value(), Some(0.5));
        assert_eq!(optimizer.last_run().unwrap().state, RunState::Failed);
    }

    #[tokio::test]
    async fn jitter_lets_duplicate_points_fit() {
        let space = SearchSpace::new().add_range("x", 1.0, 1.0);
        let config = OptimizerConfig::new().with_jitter(1e-6).with_seed(10);
        let mut optimizer = BayesianOptimizer::new(config).unwrap();
        let objective = SyncObjective::new(|_: &ParameterSet| Ok(0.5));

        let report = optimizer.optimize(&objective, &space, 5).await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(optimizer.model().len(), 5);
    }

    #[tokio::test]
    async fn cancellation_stops_between_iterations() {
        let mut optimizer = seeded(11);
        let flag = optimizer.cancellation_flag();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let objective = SyncObjective::new(move |params: &ParameterSet| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                flag.cancel();
            }
            quadratic(params)
        });

        let report = optimizer
            .optimize(&objective, &quadratic_space(), 50)
            .await
            .unwrap();
        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.steps_completed, 5);
        assert_eq!(optimizer.observations().len(), 5);
        assert_eq!(optimizer.model().len(), 5);

        optimizer.cancellation_flag().reset();
        let report = optimizer
            .optimize(&objective, &quadratic_space(), 3)
            .await
            .unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.total_observations, 8);
    }

    #[tokio::test]
    async fn async_objective_is_awaited() {
        let objective = FnObjective::new(|params: ParameterSet| async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            quadratic(&params)
        });

        let mut optimizer = seeded(12);
        let report = optimizer
            .optimize(&objective, &quadratic_space(), 8)
            .await
            .unwrap();
        assert_eq!(report.steps_completed, 8);
    }

    #[tokio::test]
    async fn independent_optimizers_run_concurrently() {
        let handles: Vec<_> = (0..4u64)
            .map(|seed| {
                tokio::spawn(async move {
                    let mut optimizer = seeded(seed);
                    let objective = SyncObjective::new(quadratic);
                    optimizer
                        .optimize(&objective, &quadratic_space(), 10)
                        .await
                        .map(|report| report.total_observations)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 10);
        }
    }

    #[tokio::test]
    async fn invalid_inputs_rejected_before_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let objective = SyncObjective::new(move |_: &ParameterSet| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0.0)
        });
        let mut optimizer = seeded(13);

        let inverted = SearchSpace::new().add_range("x", 5.0, -5.0);
        assert!(matches!(
            optimizer.optimize(&objective, &inverted, 5).await,
            Err(BoError::Validation(_))
        ));
        assert!(optimizer
            .optimize(&objective, &quadratic_space(), 0)
            .await
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn history_is_bound_to_one_search_space() {
        let objective = SyncObjective::new(|_: &ParameterSet| Ok(1.0));
        let mut optimizer = seeded(14);
        optimizer.optimize(&objective, &quadratic_space(), 2).await.unwrap();

        let other = SearchSpace::new().add_range("y", 0.0, 1.0);
        assert!(optimizer.optimize(&objective, &other, 2).await.is_err());

        optimizer.reset();
        assert!(optimizer.best_params().is_none());
        optimizer.optimize(&objective, &other, 2).await.unwrap();
        assert_eq!(optimizer.observations().len(), 2);
    }

    #[test]
    fn suggest_stays_in_bounds() {
        let space = SearchSpace::new()
            .add_range("temperature", 200.0, 400.0)
            .add_range("pressure", 1.0, 2.0);
        let mut optimizer = seeded(15);

        let first = optimizer.suggest(&space).unwrap();
        assert!(optimizer.tell(&space, first, 1.0).unwrap());

        for _ in 0..5 {
            let params = optimizer.suggest(&space).unwrap();
            let t = params.get("temperature").unwrap();
            let p = params.get("pressure").unwrap();
            assert!((200.0..=400.0).contains(&t));
            assert!((1.0..=2.0).contains(&p));
        }
        // suggest does not evaluate anything
        assert_eq!(optimizer.observations().len(), 1);
    }

    #[test]
    fn tell_reorders_parameters_and_rejects_bad_values() {
        let space = SearchSpace::new().add_range("a", 0.0, 1.0).add_range("b", 0.0, 1.0);
        let mut optimizer = seeded(16);

        let params = ParameterSet::new().with("b", 0.2).with("a", 0.7);
        optimizer.tell(&space, params, 3.0).unwrap();
        assert_eq!(optimizer.observations()[0].point, vec![0.7, 0.2]);
        assert_eq!(optimizer.best_params().unwrap().values(), vec![0.7, 0.2]);

        let err = optimizer
            .tell(&space, ParameterSet::new().with("a", 0.1).with("b", 0.1), f64::INFINITY)
            .unwrap_err();
        assert!(matches!(err, BoError::Validation(_)));
        assert_eq!(optimizer.observations().len(), 1);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = OptimizerConfig::new().with_num_candidates(0);
        assert!(BayesianOptimizer::new(config).is_err());
    }
}
