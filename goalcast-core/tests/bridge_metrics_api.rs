//! Integration tests for the metrics bridge and its scrape endpoint.

use axum::body::Body;
use goalcast_core::bridge::MetricsBridge;
use goalcast_core::bridge::server::{EXPOSITION_CONTENT_TYPE, router};
use goalcast_core::error::{BridgeError, TrackingError};
use goalcast_core::settings::BridgeSettings;
use goalcast_core::tracking::{InMemoryTrackingStore, StoreOp, TrackingStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tower::ServiceExt;

fn make_bridge(store: Arc<InMemoryTrackingStore>) -> MetricsBridge {
    MetricsBridge::new(store, BridgeSettings::default())
}

fn make_request(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn get_text(bridge: MetricsBridge, uri: &str) -> (axum::http::StatusCode, String, String) {
    let app = router(Arc::new(bridge));
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, make_request(uri))
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(resp.into_body(), 100_000)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

// --- render ---

#[tokio::test]
async fn test_latest_run_per_experiment_is_exported() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let exp = store.insert_experiment("RandomForest_Experiment").await;
    store.insert_run(&exp, "r100", 100, &[("mse_local", 9.0)]).await;
    store.insert_run(&exp, "r200", 200, &[("mse_local", 1.234)]).await;
    store.insert_run(&exp, "r150", 150, &[("mse_local", 5.0)]).await;

    let text = make_bridge(store).render().await.unwrap();
    assert_eq!(text, r#"mlflow_mse_local{run_id="r200"} 1.234"#);
}

#[tokio::test]
async fn test_one_block_per_experiment() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let rf = store.insert_experiment("RF").await;
    let lr = store.insert_experiment("LR").await;
    store
        .insert_run(&rf, "a", 10, &[("mse_local", 1.0), ("f1_local", 0.5)])
        .await;
    store.insert_run(&lr, "b", 20, &[("mse_visitante", 2.5)]).await;

    let text = make_bridge(store).render().await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#"mlflow_mse_local{run_id="a"} 1.0"#,
            r#"mlflow_f1_local{run_id="a"} 0.5"#,
            r#"mlflow_mse_visitante{run_id="b"} 2.5"#,
        ]
    );
}

#[tokio::test]
async fn test_default_experiment_is_never_exported() {
    let store = Arc::new(InMemoryTrackingStore::new());
    store.insert_run("0", "default-run", 999, &[("mse_local", 7.0)]).await;
    let exp = store.insert_experiment("RF").await;
    store.insert_run(&exp, "rf-run", 1, &[("mse_local", 3.0)]).await;

    let text = make_bridge(store).render().await.unwrap();
    assert!(!text.contains("default-run"));
    assert!(text.contains("rf-run"));
}

#[tokio::test]
async fn test_only_default_experiment_is_no_experiments() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let err = make_bridge(store.clone()).render().await.unwrap_err();
    assert!(matches!(err, BridgeError::NoExperiments));
    assert_eq!(store.call_count(StoreOp::SearchRuns).await, 0);
}

#[tokio::test]
async fn test_experiments_without_runs_is_no_runs() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let exp = store.insert_experiment("RF").await;
    let err = make_bridge(store).render().await.unwrap_err();
    match err {
        BridgeError::NoRuns { experiment_ids } => assert_eq!(experiment_ids, vec![exp]),
        other => panic!("expected NoRuns, got {other:?}"),
    }
}

#[tokio::test]
async fn test_runs_without_metrics_render_empty() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let exp = store.insert_experiment("RF").await;
    store.insert_run(&exp, "bare", 1, &[]).await;
    assert_eq!(make_bridge(store).render().await.unwrap(), "");
}

#[tokio::test]
async fn test_upstream_failure_yields_no_partial_output() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let exp = store.insert_experiment("RF").await;
    store.insert_run(&exp, "a", 1, &[("mse_local", 1.0)]).await;
    store.fail_after(StoreOp::SearchRuns, 0).await;

    let err = make_bridge(store).render().await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Tracking(TrackingError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_max_experiments_bounds_the_search() {
    let store = Arc::new(InMemoryTrackingStore::new());
    for i in 0..3 {
        let exp = store.insert_experiment(&format!("E{i}")).await;
        store
            .insert_run(&exp, &format!("run{i}"), 1, &[("mse_local", 1.0)])
            .await;
    }
    let bridge = MetricsBridge::new(
        store.clone(),
        BridgeSettings {
            max_experiments: 2,
            ..Default::default()
        },
    );
    // `Default` takes one of the two slots.
    let text = bridge.render().await.unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("run0"));
    assert_eq!(store.search_experiments(10).await.unwrap().len(), 4);
}

// --- /metrics ---

#[tokio::test]
async fn test_metrics_endpoint_serves_exposition() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let exp = store.insert_experiment("RF").await;
    store.insert_run(&exp, "abc", 1, &[("mse_local", 1.234)]).await;

    let (status, content_type, body) = get_text(make_bridge(store), "/metrics").await;
    assert_eq!(status, 200);
    assert_eq!(content_type, EXPOSITION_CONTENT_TYPE);
    assert_eq!(body, "mlflow_mse_local{run_id=\"abc\"} 1.234\n");
}

#[tokio::test]
async fn test_metrics_endpoint_reports_bad_gateway() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let (status, _, body) = get_text(make_bridge(store), "/metrics").await;
    assert_eq!(status, 502);
    assert!(body.contains("No experiments found"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let store = Arc::new(InMemoryTrackingStore::new());
    let (status, _, body) = get_text(make_bridge(store), "/health").await;
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
}
