//! Objective functions and cancellation.

use async_trait::async_trait;
use bo_types::ParameterSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The function being maximized.
///
/// Evaluation may be slow or remote; the optimizer awaits each call before
/// choosing the next point. Errors abort the run and are returned to the
/// caller unchanged.
#[async_trait]
pub trait Objective: Send + Sync {
    async fn evaluate(&self, params: &ParameterSet) -> anyhow::Result<f64>;
}

/// Adapter for an async closure `Fn(ParameterSet) -> impl Future`.
pub struct FnObjective<F> {
    func: F,
}

impl<F, Fut> FnObjective<F>
where
    F: Fn(ParameterSet) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<f64>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Objective for FnObjective<F>
where
    F: Fn(ParameterSet) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<f64>> + Send + 'static,
{
    async fn evaluate(&self, params: &ParameterSet) -> anyhow::Result<f64> {
        (self.func)(params.clone()).await
    }
}

/// Adapter for a plain synchronous closure.
pub struct SyncObjective<F> {
    func: F,
}

impl<F> SyncObjective<F>
where
    F: Fn(&ParameterSet) -> anyhow::Result<f64> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Objective for SyncObjective<F>
where
    F: Fn(&ParameterSet) -> anyhow::Result<f64> + Send + Sync,
{
    async fn evaluate(&self, params: &ParameterSet) -> anyhow::Result<f64> {
        (self.func)(params)
    }
}

/// Shared flag checked between optimizer iterations.
///
/// Clones share state, so one can be handed to another task or a signal
/// handler while the optimizer keeps its own.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the optimizer can run again.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
