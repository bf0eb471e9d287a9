//! Training: pipeline, metrics, registration and reproducibility tags.

pub mod metrics;
pub mod pipeline;
pub mod registration;
pub mod reproducibility;

pub use metrics::{MetricSet, evaluate};
pub use pipeline::{InputSample, PipelineOutput};
pub use registration::register;
pub use reproducibility::RunFingerprint;

use crate::error::MlError;
use goalcast_core::experiment::ExperimentConfig;
use goalcast_core::tracking::TrackingStore;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Load one configuration, train it, and register the run. Returns the run id.
///
/// Training runs on the blocking pool; registration runs on the caller's task.
pub async fn execute_config(path: &Path, store: &dyn TrackingStore) -> Result<String, MlError> {
    execute_config_within(path, store, None).await
}

/// [`execute_config`] with a time limit.
///
/// The limit is checked once training has finished and before anything is
/// written to the store. Training itself always runs to completion, and a
/// registration that has started is never interrupted, so a run is either
/// recorded in full or not at all.
pub async fn execute_config_within(
    path: &Path,
    store: &dyn TrackingStore,
    limit: Option<Duration>,
) -> Result<String, MlError> {
    let started = Instant::now();
    let config = ExperimentConfig::load(path)?;
    info!(config = %path.display(), run = %config.run_name, "executing experiment");

    let training_config = config.clone();
    let output = tokio::task::spawn_blocking(move || pipeline::run(&training_config))
        .await
        .map_err(|e| MlError::training(format!("training task failed: {e}")))??;

    if let Some(limit) = limit {
        if started.elapsed() > limit {
            warn!(
                config = %path.display(),
                limit = ?limit,
                elapsed = ?started.elapsed(),
                "time limit reached before registration, discarding run"
            );
            return Err(MlError::TimedOut(limit));
        }
    }

    register(
        store,
        &config,
        &output.metrics,
        &output.models,
        &output.input_sample,
    )
    .await
}
