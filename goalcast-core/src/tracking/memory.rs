//! In-process tracking store.
//!
//! Behaves like a small MLflow server: it starts with the `Default`
//! experiment (id `0`), soft-deletes runs, and keeps artifacts in memory.
//! Any operation can be made to fail after a number of successful calls,
//! which is how partial-failure paths are exercised.

use super::{
    Experiment, LogBatch, MetricEntry, ModelVersion, RunData, RunInfo, RunStatus, RunTag,
    TrackingRun, TrackingStore,
};
use crate::error::TrackingError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    SearchExperiments,
    SearchRuns,
    GetOrCreateExperiment,
    CreateRun,
    LogBatch,
    LogArtifact,
    CreateModelVersion,
    DeleteModelVersion,
    SetTerminated,
    DeleteRun,
}

/// A run as held by the in-memory store.
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub run: TrackingRun,
    pub deleted: bool,
    pub artifacts: BTreeMap<String, Vec<u8>>,
}

/// A model version as held by the in-memory store.
#[derive(Debug, Clone)]
pub struct StoredModelVersion {
    pub version: ModelVersion,
    pub source: String,
    pub run_id: String,
    pub deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    experiments: Vec<Experiment>,
    runs: Vec<StoredRun>,
    model_versions: Vec<StoredModelVersion>,
    next_id: u64,
    calls: HashMap<StoreOp, usize>,
    failures: HashMap<StoreOp, usize>,
}

impl State {
    fn check(&mut self, op: StoreOp) -> Result<(), TrackingError> {
        let calls = self.calls.entry(op).or_default();
        if let Some(&after) = self.failures.get(&op) {
            if *calls >= after {
                return Err(TrackingError::Status {
                    endpoint: format!("{op:?}"),
                    status: 500,
                    body: "injected failure".into(),
                });
            }
        }
        *calls += 1;
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn run_mut(&mut self, run_id: &str) -> Result<&mut StoredRun, TrackingError> {
        self.runs
            .iter_mut()
            .find(|r| r.run.info.run_id == run_id && !r.deleted)
            .ok_or_else(|| not_found(format!("run '{run_id}'")))
    }
}

fn not_found(what: String) -> TrackingError {
    TrackingError::Status {
        endpoint: "memory".into(),
        status: 404,
        body: format!("RESOURCE_DOES_NOT_EXIST: {what}"),
    }
}

/// Tracking store that lives entirely in memory.
#[derive(Debug)]
pub struct InMemoryTrackingStore {
    state: Mutex<State>,
}

impl Default for InMemoryTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        let state = State {
            experiments: vec![Experiment {
                experiment_id: "0".into(),
                name: "Default".into(),
            }],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make `op` fail once it has succeeded `after` times.
    pub async fn fail_after(&self, op: StoreOp, after: usize) {
        self.state.lock().await.failures.insert(op, after);
    }

    /// Add an experiment directly, returning its id.
    pub async fn insert_experiment(&self, name: &str) -> String {
        let mut state = self.state.lock().await;
        let id = state.next_id().to_string();
        state.experiments.push(Experiment {
            experiment_id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    /// Add a finished run directly.
    pub async fn insert_run(
        &self,
        experiment_id: &str,
        run_id: &str,
        end_time: i64,
        metrics: &[(&str, f64)],
    ) {
        let mut state = self.state.lock().await;
        let metrics = metrics
            .iter()
            .map(|(k, v)| MetricEntry::new(*k, *v, end_time))
            .collect();
        state.runs.push(StoredRun {
            run: TrackingRun {
                info: RunInfo {
                    run_id: run_id.to_string(),
                    experiment_id: experiment_id.to_string(),
                    run_name: None,
                    end_time,
                    artifact_uri: format!("memory:/{experiment_id}/{run_id}/artifacts"),
                    status: Some(RunStatus::Finished),
                },
                data: RunData {
                    metrics,
                    ..Default::default()
                },
            },
            deleted: false,
            artifacts: BTreeMap::new(),
        });
    }

    /// Every run ever created, deleted ones included.
    pub async fn runs(&self) -> Vec<StoredRun> {
        self.state.lock().await.runs.clone()
    }

    /// Runs that have not been deleted.
    pub async fn live_runs(&self) -> Vec<StoredRun> {
        self.state
            .lock()
            .await
            .runs
            .iter()
            .filter(|r| !r.deleted)
            .cloned()
            .collect()
    }

    /// Model versions that have not been deleted.
    pub async fn live_model_versions(&self) -> Vec<StoredModelVersion> {
        self.state
            .lock()
            .await
            .model_versions
            .iter()
            .filter(|v| !v.deleted)
            .cloned()
            .collect()
    }

    pub async fn experiments(&self) -> Vec<Experiment> {
        self.state.lock().await.experiments.clone()
    }

    /// Number of calls to `op` that went through.
    pub async fn call_count(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    fn location(&self) -> String {
        "memory://".to_string()
    }

    async fn search_experiments(
        &self,
        max_results: usize,
    ) -> Result<Vec<Experiment>, TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::SearchExperiments)?;
        Ok(state
            .experiments
            .iter()
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn search_runs(
        &self,
        experiment_ids: &[String],
    ) -> Result<Vec<TrackingRun>, TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::SearchRuns)?;
        Ok(state
            .runs
            .iter()
            .filter(|r| !r.deleted && experiment_ids.contains(&r.run.info.experiment_id))
            .map(|r| r.run.clone())
            .collect())
    }

    async fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::GetOrCreateExperiment)?;
        if let Some(existing) = state.experiments.iter().find(|e| e.name == name) {
            return Ok(existing.experiment_id.clone());
        }
        let id = state.next_id().to_string();
        state.experiments.push(Experiment {
            experiment_id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        tags: &[RunTag],
    ) -> Result<RunInfo, TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::CreateRun)?;
        if !state
            .experiments
            .iter()
            .any(|e| e.experiment_id == experiment_id)
        {
            return Err(not_found(format!("experiment '{experiment_id}'")));
        }
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let info = RunInfo {
            run_id: run_id.clone(),
            experiment_id: experiment_id.to_string(),
            run_name: Some(run_name.to_string()),
            end_time: 0,
            artifact_uri: format!("memory:/{experiment_id}/{run_id}/artifacts"),
            status: Some(RunStatus::Running),
        };
        state.runs.push(StoredRun {
            run: TrackingRun {
                info: info.clone(),
                data: RunData {
                    tags: tags.to_vec(),
                    ..Default::default()
                },
            },
            deleted: false,
            artifacts: BTreeMap::new(),
        });
        Ok(info)
    }

    async fn log_batch(&self, run_id: &str, batch: &LogBatch) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::LogBatch)?;
        let stored = state.run_mut(run_id)?;
        let data = &mut stored.run.data;
        data.metrics.extend(batch.metrics.iter().cloned());
        data.params.extend(batch.params.iter().cloned());
        for tag in &batch.tags {
            data.tags.retain(|t| t.key != tag.key);
            data.tags.push(tag.clone());
        }
        Ok(())
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::LogArtifact)?;
        let stored = state.run_mut(&run.run_id)?;
        stored.artifacts.insert(path.to_string(), contents);
        Ok(())
    }

    async fn create_model_version(
        &self,
        model_name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::CreateModelVersion)?;
        let next = state
            .model_versions
            .iter()
            .filter(|v| v.version.name == model_name)
            .count()
            + 1;
        let version = ModelVersion {
            name: model_name.to_string(),
            version: next.to_string(),
        };
        state.model_versions.push(StoredModelVersion {
            version: version.clone(),
            source: source.to_string(),
            run_id: run_id.to_string(),
            deleted: false,
        });
        Ok(version)
    }

    async fn delete_model_version(&self, version: &ModelVersion) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::DeleteModelVersion)?;
        let stored = state
            .model_versions
            .iter_mut()
            .find(|v| &v.version == version && !v.deleted)
            .ok_or_else(|| not_found(format!("model version {version:?}")))?;
        stored.deleted = true;
        Ok(())
    }

    async fn set_terminated(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: i64,
    ) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::SetTerminated)?;
        let stored = state.run_mut(run_id)?;
        stored.run.info.status = Some(status);
        stored.run.info.end_time = end_time;
        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.check(StoreOp::DeleteRun)?;
        let stored = state.run_mut(run_id)?;
        stored.deleted = true;
        Ok(())
    }
}
