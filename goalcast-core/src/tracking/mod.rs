//! Experiment-tracking store abstraction.
//!
//! [`TrackingStore`] is the seam between Goalcast and its system of record.
//! [`MlflowClient`] talks to an MLflow tracking server over its REST API;
//! [`InMemoryTrackingStore`] keeps everything in process and can be told to
//! fail specific operations.

pub mod memory;
pub mod mlflow;

pub use memory::{InMemoryTrackingStore, StoreOp};
pub use mlflow::MlflowClient;

use crate::error::TrackingError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// A named grouping of runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

/// Run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    /// Epoch milliseconds; `0` while the run has not ended.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end_time: i64,
    #[serde(default)]
    pub artifact_uri: String,
    #[serde(default)]
    pub status: Option<RunStatus>,
}

/// One metric value as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub key: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub value: f64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub step: i64,
}

impl MetricEntry {
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            step: 0,
        }
    }
}

/// A logged hyperparameter; values are always text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// A run tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTag {
    pub key: String,
    pub value: String,
}

impl RunTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Metrics, params and tags attached to a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub tags: Vec<RunTag>,
}

/// A run as returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRun {
    pub info: RunInfo,
    #[serde(default)]
    pub data: RunData,
}

/// Everything written to a run in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogBatch {
    pub metrics: Vec<MetricEntry>,
    pub params: Vec<Param>,
    pub tags: Vec<RunTag>,
}

/// A registered model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
}

/// Operations Goalcast needs from a tracking store.
///
/// Implementations are shared across tasks, so every method takes `&self`.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Human-readable location of the store, for logs and summaries.
    fn location(&self) -> String;

    /// List up to `max_results` experiments.
    async fn search_experiments(&self, max_results: usize)
    -> Result<Vec<Experiment>, TrackingError>;

    /// All runs of the given experiments, in one call.
    async fn search_runs(&self, experiment_ids: &[String])
    -> Result<Vec<TrackingRun>, TrackingError>;

    /// Return the id of the named experiment, creating it when absent.
    async fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError>;

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        tags: &[RunTag],
    ) -> Result<RunInfo, TrackingError>;

    async fn log_batch(&self, run_id: &str, batch: &LogBatch) -> Result<(), TrackingError>;

    /// Store `contents` at `path`, relative to the run's artifact root.
    async fn log_artifact(
        &self,
        run: &RunInfo,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), TrackingError>;

    /// Register a new version of `model_name` backed by `source`.
    async fn create_model_version(
        &self,
        model_name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, TrackingError>;

    async fn delete_model_version(&self, version: &ModelVersion) -> Result<(), TrackingError>;

    async fn set_terminated(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: i64,
    ) -> Result<(), TrackingError>;

    async fn delete_run(&self, run_id: &str) -> Result<(), TrackingError>;
}

/// Accept an integer, a numeric string, or null (as `0`).
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(0),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("invalid integer {n}"))),
        serde_json::Value::String(s) if s.is_empty() => Ok(0),
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid integer '{s}'"))),
        other => Err(D::Error::custom(format!("expected integer, got {other}"))),
    }
}

/// Accept a number or a numeric string (`"NaN"`, `"Infinity"` included).
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom(format!("invalid number {n}"))),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => s
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid number '{s}'"))),
        },
        other => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}
