//! MLflow client wire contract, checked against a local axum server that
//! records every request and replies with canned bodies.

use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use goalcast_core::error::TrackingError;
use goalcast_core::settings::{BridgeSettings, TrackingSettings};
use goalcast_core::tracking::{LogBatch, MetricEntry, Param, RunStatus, RunTag, TrackingStore};
use goalcast_core::{MetricsBridge, MlflowClient};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    body: String,
}

#[derive(Default)]
struct FakeMlflow {
    requests: Mutex<Vec<Recorded>>,
    /// Path (without the `/api/2.0/mlflow/` prefix) to status and body.
    replies: HashMap<&'static str, (StatusCode, String)>,
}

impl FakeMlflow {
    fn reply(mut self, path: &'static str, status: StatusCode, body: Value) -> Self {
        self.replies.insert(path, (status, body.to_string()));
        self
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn body_of(&self, path: &str) -> Value {
        let request = self
            .requests()
            .into_iter()
            .find(|r| r.path.ends_with(path))
            .unwrap_or_else(|| panic!("no request to {path}"));
        serde_json::from_str(&request.body).unwrap()
    }
}

async fn record(
    State(fake): State<Arc<FakeMlflow>>,
    method: Method,
    uri: Uri,
    body: String,
) -> (StatusCode, String) {
    fake.requests.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
    });
    let endpoint = uri.path().trim_start_matches("/api/2.0/mlflow/");
    fake.replies
        .get(endpoint)
        .cloned()
        .unwrap_or((StatusCode::OK, "{}".to_string()))
}

/// Serve `fake` on an ephemeral port and build a client pointed at it.
async fn start(fake: FakeMlflow) -> (Arc<FakeMlflow>, MlflowClient) {
    let fake = Arc::new(fake);
    let app = Router::new().fallback(record).with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = MlflowClient::new(&TrackingSettings {
        uri: format!("http://{addr}"),
        ..Default::default()
    })
    .unwrap();
    (fake, client)
}

#[tokio::test]
async fn test_search_experiments_request_and_decoding() {
    let (fake, client) = start(FakeMlflow::default().reply(
        "experiments/search",
        StatusCode::OK,
        json!({"experiments": [
            {"experiment_id": "0", "name": "Default", "lifecycle_stage": "active"},
            {"experiment_id": "7", "name": "RandomForestRegressor_JSON_Futbol"}
        ]}),
    ))
    .await;

    let experiments = client.search_experiments(8).await.unwrap();

    assert_eq!(experiments.len(), 2);
    assert_eq!(experiments[1].experiment_id, "7");
    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/api/2.0/mlflow/experiments/search");
    assert_eq!(requests[0].query.as_deref(), Some("max_results=8"));
}

#[tokio::test]
async fn test_search_runs_request_and_decoding() {
    let (fake, client) = start(FakeMlflow::default().reply(
        "runs/search",
        StatusCode::OK,
        json!({"runs": [{
            "info": {"run_id": "r1", "experiment_id": "7", "end_time": "1700", "status": "FINISHED"},
            "data": {"metrics": [{"key": "mse_local", "value": 0.5, "timestamp": 1700, "step": 0}]}
        }, {
            "info": {"run_id": "r2", "experiment_id": "7", "end_time": null}
        }]}),
    ))
    .await;

    let runs = client
        .search_runs(&["7".to_string(), "9".to_string()])
        .await
        .unwrap();

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].info.end_time, 1700);
    assert_eq!(runs[0].info.status, Some(RunStatus::Finished));
    assert_eq!(runs[0].data.metrics[0].key, "mse_local");
    assert_eq!(runs[1].info.end_time, 0);
    assert!(runs[1].data.metrics.is_empty());

    let requests = fake.requests();
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/api/2.0/mlflow/runs/search");
    assert_eq!(
        fake.body_of("runs/search"),
        json!({"experiment_ids": ["7", "9"]})
    );
}

#[tokio::test]
async fn test_create_run_and_log_batch_bodies() {
    let (fake, client) = start(FakeMlflow::default().reply(
        "runs/create",
        StatusCode::OK,
        json!({"run": {"info": {
            "run_id": "abc", "experiment_id": "7", "run_name": "LR_config_01",
            "artifact_uri": "mlflow-artifacts:/7/abc/artifacts", "status": "RUNNING"
        }, "data": {}}}),
    ))
    .await;

    let info = client
        .create_run("7", "LR_config_01", &[RunTag::new("model_type", "LinearRegression")])
        .await
        .unwrap();
    assert_eq!(info.run_id, "abc");
    assert_eq!(info.artifact_uri, "mlflow-artifacts:/7/abc/artifacts");

    let created = fake.body_of("runs/create");
    assert_eq!(created["experiment_id"], "7");
    assert_eq!(created["run_name"], "LR_config_01");
    assert_eq!(
        created["tags"],
        json!([{"key": "model_type", "value": "LinearRegression"}])
    );
    assert!(created["start_time"].is_i64());

    let batch = LogBatch {
        metrics: vec![MetricEntry::new("mse_local", 0.25, 1_700_000)],
        params: vec![Param {
            key: "fit_intercept".into(),
            value: "True".into(),
        }],
        tags: Vec::new(),
    };
    // runs/log-batch answers with the default `{}`.
    client.log_batch("abc", &batch).await.unwrap();
    assert_eq!(
        fake.body_of("runs/log-batch"),
        json!({
            "run_id": "abc",
            "metrics": [{"key": "mse_local", "value": 0.25, "timestamp": 1_700_000, "step": 0}],
            "params": [{"key": "fit_intercept", "value": "True"}],
            "tags": []
        })
    );
}

#[tokio::test]
async fn test_error_status_maps_to_tracking_error() {
    let (_, client) = start(
        FakeMlflow::default()
            .reply(
                "experiments/search",
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error_code": "INTERNAL_ERROR"}),
            )
            .reply(
                "runs/search",
                StatusCode::BAD_REQUEST,
                json!({"error_code": "INVALID_PARAMETER_VALUE"}),
            ),
    )
    .await;

    match client.search_experiments(8).await {
        Err(TrackingError::Status {
            endpoint,
            status,
            body,
        }) => {
            assert_eq!(endpoint, "experiments/search");
            assert_eq!(status, 500);
            assert!(body.contains("INTERNAL_ERROR"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    assert!(matches!(
        client.search_runs(&["1".to_string()]).await,
        Err(TrackingError::Status { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_missing_experiment_is_created() {
    let (fake, client) = start(
        FakeMlflow::default()
            .reply(
                "experiments/get-by-name",
                StatusCode::NOT_FOUND,
                json!({"error_code": "RESOURCE_DOES_NOT_EXIST"}),
            )
            .reply(
                "experiments/create",
                StatusCode::OK,
                json!({"experiment_id": "12"}),
            ),
    )
    .await;

    let id = client
        .get_or_create_experiment("PoissonRegressor_JSON_Futbol")
        .await
        .unwrap();

    assert_eq!(id, "12");
    let requests = fake.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].query.as_deref(),
        Some("experiment_name=PoissonRegressor_JSON_Futbol")
    );
    assert_eq!(
        fake.body_of("experiments/create"),
        json!({"name": "PoissonRegressor_JSON_Futbol"})
    );
}

#[tokio::test]
async fn test_bridge_renders_over_http() {
    let (fake, client) = start(
        FakeMlflow::default()
            .reply(
                "experiments/search",
                StatusCode::OK,
                json!({"experiments": [
                    {"experiment_id": "0", "name": "Default"},
                    {"experiment_id": "3", "name": "LR"}
                ]}),
            )
            .reply(
                "runs/search",
                StatusCode::OK,
                json!({"runs": [
                    {"info": {"run_id": "old", "experiment_id": "3", "end_time": 100},
                     "data": {"metrics": [{"key": "mse_local", "value": 9.0}]}},
                    {"info": {"run_id": "new", "experiment_id": "3", "end_time": 200},
                     "data": {"metrics": [{"key": "mse_local", "value": 0.75}]}}
                ]}),
            ),
    )
    .await;

    let bridge = MetricsBridge::new(Arc::new(client), BridgeSettings::default());
    let text = bridge.render().await.unwrap();

    assert_eq!(text, r#"mlflow_mse_local{run_id="new"} 0.75"#);
    assert_eq!(fake.body_of("runs/search"), json!({"experiment_ids": ["3"]}));
    assert_eq!(fake.requests()[0].query.as_deref(), Some("max_results=8"));
}
