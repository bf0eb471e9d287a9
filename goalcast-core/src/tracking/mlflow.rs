//! MLflow REST client.
//!
//! Speaks the `/api/2.0/mlflow` surface of an MLflow tracking server plus the
//! `/api/2.0/mlflow-artifacts` proxy for artifact uploads.

use super::{
    Experiment, LogBatch, ModelVersion, RunInfo, RunStatus, RunTag, TrackingRun, TrackingStore,
};
use crate::error::TrackingError;
use crate::settings::TrackingSettings;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";

/// Client for one MLflow tracking server.
#[derive(Debug, Clone)]
pub struct MlflowClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ExperimentsResponse {
    #[serde(default)]
    experiments: Vec<Experiment>,
}

#[derive(Deserialize)]
struct RunsResponse {
    #[serde(default)]
    runs: Vec<TrackingRun>,
}

#[derive(Deserialize)]
struct ExperimentByName {
    experiment: ExperimentRecord,
}

#[derive(Deserialize)]
struct ExperimentRecord {
    experiment_id: String,
    #[serde(default)]
    lifecycle_stage: Option<String>,
}

#[derive(Deserialize)]
struct CreatedExperiment {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreatedRun {
    run: TrackingRun,
}

#[derive(Deserialize)]
struct CreatedModelVersion {
    model_version: ModelVersion,
}

/// Body of endpoints that answer with `{}`.
#[derive(Deserialize)]
struct Empty {}

impl MlflowClient {
    /// Build a client with the configured timeouts.
    pub fn new(settings: &TrackingSettings) -> Result<Self, TrackingError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .connect_timeout(settings.connect_timeout())
            .build()?;
        Ok(Self {
            base_url: settings.uri.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TrackingError> {
        let url = self.endpoint(path);
        debug!(endpoint = path, "GET tracking store");
        let response = self.http.get(&url).query(query).send().await?;
        decode(path, response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TrackingError> {
        let url = self.endpoint(path);
        debug!(endpoint = path, "POST tracking store");
        let response = self.http.post(&url).json(body).send().await?;
        decode(path, response).await
    }

    /// Where an artifact lands, derived from the run's artifact root.
    fn artifact_target(&self, artifact_uri: &str, path: &str) -> Result<ArtifactTarget, TrackingError> {
        let relative = path.trim_start_matches('/');
        match url::Url::parse(artifact_uri) {
            Ok(uri) if uri.scheme() == "mlflow-artifacts" => {
                let root = uri.path().trim_matches('/');
                let encoded = relative
                    .split('/')
                    .map(|segment| urlencoding::encode(segment).into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                Ok(ArtifactTarget::Proxy(format!(
                    "{}/{ARTIFACTS_PREFIX}/{root}/{encoded}",
                    self.base_url
                )))
            }
            Ok(uri) if uri.scheme() == "file" => {
                let root = uri
                    .to_file_path()
                    .map_err(|_| TrackingError::UnsupportedArtifactUri(artifact_uri.to_string()))?;
                Ok(ArtifactTarget::File(root.join(relative)))
            }
            Ok(_) => Err(TrackingError::UnsupportedArtifactUri(
                artifact_uri.to_string(),
            )),
            Err(_) if artifact_uri.starts_with('/') => {
                Ok(ArtifactTarget::File(PathBuf::from(artifact_uri).join(relative)))
            }
            Err(_) => Err(TrackingError::UnsupportedArtifactUri(
                artifact_uri.to_string(),
            )),
        }
    }
}

#[derive(Debug, PartialEq)]
enum ArtifactTarget {
    Proxy(String),
    File(PathBuf),
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, TrackingError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TrackingError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    let bytes = response.bytes().await?;
    // Several endpoints reply with an empty body rather than `{}`.
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        &b"{}"[..]
    } else {
        bytes.as_ref()
    };
    serde_json::from_slice(body).map_err(|e| TrackingError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl TrackingStore for MlflowClient {
    fn location(&self) -> String {
        self.base_url.clone()
    }

    async fn search_experiments(
        &self,
        max_results: usize,
    ) -> Result<Vec<Experiment>, TrackingError> {
        let response: ExperimentsResponse = self
            .get(
                "experiments/search",
                &[("max_results", max_results.to_string())],
            )
            .await?;
        Ok(response.experiments)
    }

    async fn search_runs(
        &self,
        experiment_ids: &[String],
    ) -> Result<Vec<TrackingRun>, TrackingError> {
        let response: RunsResponse = self
            .post("runs/search", &json!({ "experiment_ids": experiment_ids }))
            .await?;
        Ok(response.runs)
    }

    async fn get_or_create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let lookup: Result<ExperimentByName, _> = self
            .get(
                "experiments/get-by-name",
                &[("experiment_name", name.to_string())],
            )
            .await;
        match lookup {
            Ok(found) => {
                if found.experiment.lifecycle_stage.as_deref() == Some("deleted") {
                    return Err(TrackingError::Rejected {
                        operation: "experiments/get-by-name".into(),
                        message: format!("experiment '{name}' is deleted; restore or rename it"),
                    });
                }
                Ok(found.experiment.experiment_id)
            }
            Err(e) if e.is_not_found() => {
                let created: CreatedExperiment = self
                    .post("experiments/create", &json!({ "name": name }))
                    .await?;
                debug!(experiment = name, id = %created.experiment_id, "created experiment");
                Ok(created.experiment_id)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        tags: &[RunTag],
    ) -> Result<RunInfo, TrackingError> {
        let created: CreatedRun = self
            .post(
                "runs/create",
                &json!({
                    "experiment_id": experiment_id,
                    "run_name": run_name,
                    "start_time": chrono::Utc::now().timestamp_millis(),
                    "tags": tags,
                }),
            )
            .await?;
        Ok(created.run.info)
    }

    async fn log_batch(&self, run_id: &str, batch: &LogBatch) -> Result<(), TrackingError> {
        let _: Empty = self
            .post(
                "runs/log-batch",
                &json!({
                    "run_id": run_id,
                    "metrics": batch.metrics,
                    "params": batch.params,
                    "tags": batch.tags,
                }),
            )
            .await?;
        Ok(())
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), TrackingError> {
        match self.artifact_target(&run.artifact_uri, path)? {
            ArtifactTarget::Proxy(url) => {
                debug!(artifact = path, "PUT artifact");
                let response = self.http.put(&url).body(contents).send().await?;
                let _: Empty = decode("mlflow-artifacts", response).await?;
            }
            ArtifactTarget::File(target) => {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, contents).await?;
            }
        }
        Ok(())
    }

    async fn create_model_version(
        &self,
        model_name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, TrackingError> {
        let registered: Result<Empty, _> = self
            .post("registered-models/create", &json!({ "name": model_name }))
            .await;
        match registered {
            Ok(_) => debug!(model = model_name, "registered model created"),
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }

        let created: CreatedModelVersion = self
            .post(
                "model-versions/create",
                &json!({ "name": model_name, "source": source, "run_id": run_id }),
            )
            .await?;
        Ok(created.model_version)
    }

    async fn delete_model_version(&self, version: &ModelVersion) -> Result<(), TrackingError> {
        let _: Empty = self
            .post(
                "model-versions/delete",
                &json!({ "name": version.name, "version": version.version }),
            )
            .await?;
        Ok(())
    }

    async fn set_terminated(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: i64,
    ) -> Result<(), TrackingError> {
        let _: serde_json::Value = self
            .post(
                "runs/update",
                &json!({ "run_id": run_id, "status": status, "end_time": end_time }),
            )
            .await?;
        Ok(())
    }

    async fn delete_run(&self, run_id: &str) -> Result<(), TrackingError> {
        let _: Empty = self.post("runs/delete", &json!({ "run_id": run_id })).await?;
        Ok(())
    }
}
