//! Run registration against a tracking store.
//!
//! A run is recorded in full or not at all: when any step after the run is
//! created fails, registered model versions are removed, the run is marked
//! failed and deleted, and the original error is returned.

use super::metrics::MetricSet;
use super::pipeline::InputSample;
use super::reproducibility::RunFingerprint;
use crate::error::MlError;
use crate::models::{Regressor, TrainedPair};
use goalcast_core::experiment::ExperimentConfig;
use goalcast_core::tracking::{
    LogBatch, MetricEntry, ModelVersion, Param, RunInfo, RunStatus, RunTag, TrackingStore,
};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Tag carrying the regressor identifier.
pub const MODEL_TYPE_TAG: &str = "model_type";

/// Which of the two targets a model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Local,
    Visitor,
}

impl Role {
    /// Artifact directory inside the run.
    pub fn artifact_dir(&self) -> &'static str {
        match self {
            Self::Local => "model_local",
            Self::Visitor => "model_visitante",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Visitor => "Visitante",
        }
    }
}

/// `<model_type>_JSON_<Role>_<run_name>`
pub fn registered_model_name(config: &ExperimentConfig, role: Role) -> String {
    format!(
        "{}_JSON_{}_{}",
        config.model_type,
        role.label(),
        config.run_name
    )
}

/// Record parameters, metrics, tags and both models as one run.
/// Returns the run id.
pub async fn register(
    store: &dyn TrackingStore,
    config: &ExperimentConfig,
    metrics: &MetricSet,
    pair: &TrainedPair,
    sample: &InputSample,
) -> Result<String, MlError> {
    let tags = run_tags(config)?;
    let experiment_id = store.get_or_create_experiment(&config.experiment_name).await?;
    let run = store
        .create_run(&experiment_id, &config.run_name, &tags)
        .await?;
    info!(run_id = %run.run_id, experiment = %config.experiment_name, "run created");

    let mut versions = Vec::new();
    match record(store, &run, config, metrics, pair, sample, &mut versions).await {
        Ok(()) => {
            info!(run_id = %run.run_id, models = versions.len(), "run registered");
            Ok(run.run_id)
        }
        Err(e) => {
            warn!(run_id = %run.run_id, error = %e, "registration failed, rolling back");
            compensate(store, &run, &versions).await;
            Err(e)
        }
    }
}

async fn record(
    store: &dyn TrackingStore,
    run: &RunInfo,
    config: &ExperimentConfig,
    metrics: &MetricSet,
    pair: &TrainedPair,
    sample: &InputSample,
    versions: &mut Vec<ModelVersion>,
) -> Result<(), MlError> {
    let now = chrono::Utc::now().timestamp_millis();
    let batch = LogBatch {
        metrics: metrics
            .iter()
            .map(|(k, v)| MetricEntry::new(k, v, now))
            .collect(),
        params: config
            .parameters
            .iter()
            .map(|(k, v)| Param {
                key: k.clone(),
                value: python_repr(v),
            })
            .collect(),
        tags: Vec::new(),
    };
    store.log_batch(&run.run_id, &batch).await?;

    for (role, model) in [(Role::Local, &pair.local), (Role::Visitor, &pair.visitor)] {
        upload_model(store, run, config, role, model.as_ref(), sample).await?;
        let source = format!(
            "{}/{}",
            run.artifact_uri.trim_end_matches('/'),
            role.artifact_dir()
        );
        let version = store
            .create_model_version(&registered_model_name(config, role), &source, &run.run_id)
            .await?;
        versions.push(version);
    }

    store
        .set_terminated(
            &run.run_id,
            RunStatus::Finished,
            chrono::Utc::now().timestamp_millis(),
        )
        .await?;
    Ok(())
}

async fn upload_model(
    store: &dyn TrackingStore,
    run: &RunInfo,
    config: &ExperimentConfig,
    role: Role,
    model: &dyn Regressor,
    sample: &InputSample,
) -> Result<(), MlError> {
    let dir = role.artifact_dir();
    let model_json = serde_json::to_vec_pretty(&model.to_artifact()?)?;
    let example = serde_json::to_vec(&json!({
        "columns": sample.columns,
        "data": [sample.values],
    }))?;
    let mlmodel = mlmodel_document(run, config, role, sample)?;

    store
        .log_artifact(run, &format!("{dir}/model.json"), model_json)
        .await?;
    store
        .log_artifact(run, &format!("{dir}/input_example.json"), example)
        .await?;
    store
        .log_artifact(run, &format!("{dir}/MLmodel"), mlmodel.into_bytes())
        .await?;
    Ok(())
}

/// Model descriptor with flavour, signature and input-example metadata.
fn mlmodel_document(
    run: &RunInfo,
    config: &ExperimentConfig,
    role: Role,
    sample: &InputSample,
) -> Result<String, MlError> {
    let inputs: Vec<Value> = sample
        .columns
        .iter()
        .map(|c| json!({"type": "double", "name": c, "required": true}))
        .collect();
    let outputs = json!([{"type": "tensor", "tensor-spec": {"dtype": "float64", "shape": [-1]}}]);
    let quote = |v: String| format!("'{}'", v.replace('\'', "''"));

    Ok(format!(
        "artifact_path: {dir}\n\
         flavors:\n  \
           goalcast:\n    \
             data: model.json\n    \
             goalcast_version: {version}\n    \
             model_type: {model_type}\n\
         run_id: {run_id}\n\
         saved_input_example_info:\n  \
           artifact_path: input_example.json\n  \
           pandas_orient: split\n  \
           type: dataframe\n\
         signature:\n  \
           inputs: {inputs}\n  \
           outputs: {outputs}\n  \
           params: null\n\
         utc_time_created: '{created}'\n",
        dir = role.artifact_dir(),
        version = env!("CARGO_PKG_VERSION"),
        model_type = config.model_type,
        run_id = run.run_id,
        inputs = quote(serde_json::to_string(&inputs)?),
        outputs = quote(serde_json::to_string(&outputs)?),
        created = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
    ))
}

/// Undo a partially recorded run. Cleanup failures are logged, not raised.
async fn compensate(store: &dyn TrackingStore, run: &RunInfo, versions: &[ModelVersion]) {
    for version in versions.iter().rev() {
        if let Err(e) = store.delete_model_version(version).await {
            warn!(model = %version.name, version = %version.version, error = %e, "could not delete model version");
        }
    }
    let now = chrono::Utc::now().timestamp_millis();
    if let Err(e) = store.set_terminated(&run.run_id, RunStatus::Failed, now).await {
        warn!(run_id = %run.run_id, error = %e, "could not mark run failed");
    }
    if let Err(e) = store.delete_run(&run.run_id).await {
        warn!(run_id = %run.run_id, error = %e, "could not delete run");
    }
}

fn run_tags(config: &ExperimentConfig) -> Result<Vec<RunTag>, MlError> {
    let mut tags: Vec<RunTag> = config
        .tags
        .iter()
        .map(|(k, v)| RunTag::new(k, v))
        .collect();
    tags.push(RunTag::new(MODEL_TYPE_TAG, config.model_type.as_str()));
    tags.extend(RunFingerprint::capture(config)?.tags());
    Ok(tags)
}

/// Render a parameter value the way Python prints it (`None`, `True`, `1.0`).
pub fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 => {
                format!("{f:.1}")
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
