use std::time::Duration;

use bo_optimizer::{BayesianOptimizer, FnObjective, OptimizerConfig, ParameterSet, SearchSpace};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STEPS: usize = 60;

/// Stand-in for an expensive simulation: a noise-free yield curve peaking
/// at 320 degrees, with some artificial latency.
async fn simulated_yield(params: ParameterSet) -> anyhow::Result<f64> {
    let temperature = params
        .get("temperature")
        .ok_or_else(|| anyhow::anyhow!("missing parameter 'temperature'"))?;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let offset = (temperature - 320.0) / 40.0;
    Ok(100.0 * (-offset * offset).exp())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("BO_CONFIG") {
        Ok(path) => {
            info!(%path, "loading optimizer config");
            OptimizerConfig::from_json_file(&path)?
        }
        Err(_) => OptimizerConfig::default()
            .with_kernel(2.5, 20.0)
            .with_jitter(1e-6),
    };
    let steps = std::env::var("BO_STEPS")
        .ok()
        .map(|s| s.parse::<usize>())
        .transpose()?
        .unwrap_or(DEFAULT_STEPS);

    let mut optimizer = BayesianOptimizer::new(config)?;
    let space = SearchSpace::new().add_range("temperature", 200.0, 450.0);

    let cancel = optimizer.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current evaluation");
            cancel.cancel();
        }
    });

    let objective = FnObjective::new(simulated_yield);
    let report = optimizer.optimize(&objective, &space, steps).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
