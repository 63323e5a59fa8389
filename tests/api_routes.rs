mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bike_demand_forecaster::api;
use bike_demand_forecaster::app_state::AppState;
use bike_demand_forecaster::config::Config;
use bike_demand_forecaster::ml::registry::{ComparisonRow, ComparisonTable, ModelRegistry};
use bike_demand_forecaster::pipeline::{PipelineRun, RunLogWriter};
use serde_json::Value;
use tower::ServiceExt;

fn app(cfg: &Config) -> Router {
    api::router(AppState::new(cfg.clone()), cfg)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_reports_degraded_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());

    let (status, body) = get(app(&cfg), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["model"]["status"], "degraded");
}

#[tokio::test]
async fn predictions_filter_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());
    common::write_clean_serving_inputs(
        &cfg,
        &[
            ("Seoul", 20.0, "2022-06-01 12:00:00"),
            ("Seoul", 26.0, "2022-06-01 15:00:00"),
            ("New York", 10.0, "2022-06-01 12:00:00"),
        ],
    );

    let (status, body) = get(app(&cfg), "/api/v1/predictions").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["entity"], "Seoul");
    assert_eq!(rows[0]["peak_demand"], 590);
    assert_eq!(rows[0]["prediction_source"], "fallback");
    assert_eq!(rows[0]["data_source"], "live");
    assert_eq!(body["metadata"]["total_count"], 2);
    assert!(body["metadata"]["batch_version"].is_string());

    let (_, body) = get(app(&cfg), "/api/v1/predictions?country=United%20States").await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["entity"], "New York");
    assert_eq!(rows[0]["peak_demand"], 350);

    let (_, body) = get(app(&cfg), "/api/v1/predictions?limit=1").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["metadata"]["total_count"], 2);
}

#[tokio::test]
async fn predictions_without_data_serve_sample() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());

    let (status, body) = get(app(&cfg), "/api/v1/predictions").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r["data_source"] == "sample"));
}

#[tokio::test]
async fn malformed_limit_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());
    common::write_clean_serving_inputs(
        &cfg,
        &[
            ("Seoul", 20.0, "2022-06-01 12:00:00"),
            ("New York", 10.0, "2022-06-01 12:00:00"),
        ],
    );

    let (status, body) = get(app(&cfg), "/api/v1/predictions?limit=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["metadata"]["total_count"], 2);

    let (status, body) = get(app(&cfg), "/api/v1/predictions?limit=1&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn comparison_is_empty_until_written() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());

    let (status, body) = get(app(&cfg), "/api/v1/models/comparison").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!([]));

    let row = |name: &str, rmse: f64| ComparisonRow {
        model_name: name.to_string(),
        rmse,
        r2: 0.5,
        mae: rmse * 0.8,
        mape: 20.0,
        training_samples: 100,
    };
    ModelRegistry::new(&cfg.paths.models_dir)
        .write_comparison(&ComparisonTable::new(vec![row("mean_baseline", 400.0), row("linear_regression", 250.0)]))
        .unwrap();

    let (_, body) = get(app(&cfg), "/api/v1/models/comparison").await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["model_name"], "linear_regression");
}

#[tokio::test]
async fn latest_pipeline_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());

    let (status, body) = get(app(&cfg), "/api/v1/pipeline/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let mut run = PipelineRun::new(false);
    run.success = true;
    RunLogWriter::new(&cfg.paths.logs_dir).persist(&run).unwrap();

    let (status, body) = get(app(&cfg), "/api/v1/pipeline/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["run_id"], run.run_id.to_string());
    assert_eq!(body["data"]["success"], true);
}
