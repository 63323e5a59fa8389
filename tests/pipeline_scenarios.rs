mod common;

use async_trait::async_trait;
use bike_demand_forecaster::config::Config;
use bike_demand_forecaster::ml::registry::{ComparisonTable, TrainedModelArtifact};
use bike_demand_forecaster::pipeline::stages::{self, DEMAND_SUMMARY_ARTIFACT};
use bike_demand_forecaster::pipeline::{
    ArtifactHandle, ArtifactKind, HandlerRegistry, Orchestrator, PipelineStage, RunLogWriter, StageContext,
    StageHandler, StageOutput, StageStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Sleeps(Duration);

#[async_trait]
impl StageHandler for Sleeps {
    async fn run(&self, _ctx: StageContext) -> anyhow::Result<StageOutput> {
        tokio::time::sleep(self.0).await;
        Ok(StageOutput::new())
    }
}

struct Fails;

#[async_trait]
impl StageHandler for Fails {
    async fn run(&self, _ctx: StageContext) -> anyhow::Result<StageOutput> {
        anyhow::bail!("upstream file is malformed")
    }
}

/// Counts invocations and requires an artifact when given one.
struct Counting {
    calls: Arc<AtomicUsize>,
    requires: Option<&'static str>,
    publishes: Option<&'static str>,
}

#[async_trait]
impl StageHandler for Counting {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = self.requires {
            ctx.catalog.require(name)?;
        }
        let mut output = StageOutput::new();
        if let Some(name) = self.publishes {
            output.push(ArtifactHandle::new(name, ArtifactKind::Report, "unused.json"));
        }
        Ok(output)
    }
}

fn stage(id: &str, timeout_secs: u64, critical: bool) -> PipelineStage {
    PipelineStage::new(id, id, id, Duration::from_secs(timeout_secs), critical)
}

#[tokio::test(start_paused = true)]
async fn scenario_a_timeout_aborts_critical_run() {
    let mut registry = HandlerRegistry::new();
    registry
        .register("A", Arc::new(Sleeps(Duration::from_millis(10))))
        .register("B", Arc::new(Sleeps(Duration::from_secs(5))));
    let orchestrator = Orchestrator::new(registry, Arc::new(Config::default()));

    let run = orchestrator
        .run(&[stage("A", 10, true), stage("B", 1, true)], false)
        .await;

    assert!(!run.success);
    assert_eq!(run.failed_steps, vec!["B".to_string()]);
    assert_eq!(run.outcome("A").unwrap().status, StageStatus::Succeeded);
    assert_eq!(run.outcome("B").unwrap().status, StageStatus::TimeoutExceeded);
    assert_eq!(run.aborted_at.as_deref(), Some("B"));
}

#[tokio::test]
async fn continue_on_error_attempts_every_stage() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register("broken", Arc::new(Fails))
        .register(
            "after",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                requires: None,
                publishes: None,
            }),
        );
    let orchestrator = Orchestrator::new(registry, Arc::new(Config::default()));
    let stages = [
        stage("broken", 5, true),
        stage("missing", 5, true),
        stage("after", 5, true),
    ];

    let run = orchestrator.run(&stages, true).await;
    assert_eq!(run.attempted().len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.failed_steps, vec!["broken".to_string(), "missing".to_string()]);
    assert_eq!(run.outcome("missing").unwrap().status, StageStatus::NotFound);
    assert!(matches!(
        &run.outcome("broken").unwrap().status,
        StageStatus::ExecutionError { message } if message.contains("malformed")
    ));
    assert!(run.aborted_at.is_none());
    assert!(!run.success);

    let stopped = orchestrator.run(&stages, false).await;
    assert_eq!(stopped.attempted().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_critical_failure_does_not_stop_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register("optional", Arc::new(Fails)).register(
        "final",
        Arc::new(Counting {
            calls: Arc::clone(&calls),
            requires: None,
            publishes: None,
        }),
    );
    let orchestrator = Orchestrator::new(registry, Arc::new(Config::default()));

    let run = orchestrator
        .run(&[stage("optional", 5, false), stage("final", 5, true)], false)
        .await;
    assert_eq!(run.attempted().len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.failed_steps, vec!["optional".to_string()]);
    assert!(!run.success);
}

#[tokio::test]
async fn artifacts_flow_only_from_successful_stages() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register(
            "produce",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                requires: None,
                publishes: Some("reports/summary"),
            }),
        )
        .register(
            "consume",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                requires: Some("reports/summary"),
                publishes: None,
            }),
        )
        .register(
            "consume_missing",
            Arc::new(Counting {
                calls: Arc::clone(&calls),
                requires: Some("reports/never"),
                publishes: None,
            }),
        );
    let orchestrator = Orchestrator::new(registry, Arc::new(Config::default()));

    let run = orchestrator
        .run(
            &[
                stage("produce", 5, true),
                stage("consume", 5, true),
                stage("consume_missing", 5, false),
            ],
            false,
        )
        .await;

    assert_eq!(run.outcome("produce").unwrap().artifacts, vec!["reports/summary".to_string()]);
    assert!(run.outcome("consume").unwrap().succeeded());
    assert!(matches!(
        run.outcome("consume_missing").unwrap().status,
        StageStatus::ExecutionError { .. }
    ));
    let handle = orchestrator.catalog().require("reports/summary").unwrap();
    assert_eq!(handle.produced_by.as_deref(), Some("produce"));
}

#[tokio::test]
async fn run_log_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = HandlerRegistry::new();
    registry.register("fails", Arc::new(Fails));
    let orchestrator =
        Orchestrator::new(registry, Arc::new(Config::default())).with_run_log(RunLogWriter::new(dir.path()));

    let run = orchestrator.run(&[stage("fails", 5, true)], false).await;
    let latest = RunLogWriter::read_latest(dir.path()).unwrap().unwrap();
    assert_eq!(latest.run_id, run.run_id);
    assert_eq!(latest.failed_steps, vec!["fails".to_string()]);

    let logs = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("pipeline_run_"))
        .count();
    assert_eq!(logs, 1);
}

#[tokio::test]
async fn default_stages_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());
    common::write_raw_inputs(
        &cfg,
        &common::forecast_raw_csv(&[
            ("Seoul", 24.0, "2022-06-01 18:00:00"),
            ("Seoul", 21.0, "2022-06-01 09:00:00"),
            ("Paris", 19.0, "2022-06-01 12:00:00"),
        ]),
    );

    let stage_list = stages::stages_from_config(&cfg.pipeline);
    let orchestrator = Orchestrator::new(stages::default_handlers(), Arc::new(cfg.clone()))
        .with_run_log(RunLogWriter::new(&cfg.paths.logs_dir));
    let run = orchestrator.run(&stage_list, false).await;

    assert!(run.success, "failed: {:?} / {:?}", run.failed_steps, run.outcomes);
    assert_eq!(run.attempted().len(), 5);
    assert!(orchestrator.catalog().get(DEMAND_SUMMARY_ARTIFACT).is_some());

    for file in ["weather_forecast.csv", "world_cities.csv", "seoul_bike_sharing.csv", "bike_sharing_systems.csv"] {
        assert!(cfg.paths.clean_dir.join(file).exists(), "{file} not wrangled");
    }
    assert!(cfg.paths.reports_dir.join("demand_summary.json").exists());
    assert!(cfg.paths.reports_dir.join("chart_data.json").exists());

    let comparison_bytes = std::fs::read(cfg.paths.models_dir.join("model_comparison.csv")).unwrap();
    let comparison = ComparisonTable::from_csv_reader(comparison_bytes.as_slice()).unwrap();
    assert!(comparison.rows.len() >= 2);
    assert!(comparison.rows.windows(2).all(|w| w[0].rmse <= w[1].rmse));

    let best = TrainedModelArtifact::load(&cfg.serving.model_artifact).unwrap();
    assert_eq!(best.transformer.training_rows, 48);

    let latest = RunLogWriter::read_latest(&cfg.paths.logs_dir).unwrap().unwrap();
    assert!(latest.success);
}

#[tokio::test]
async fn missing_raw_input_aborts_at_collect() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = common::config_in(dir.path());

    let stage_list = stages::stages_from_config(&cfg.pipeline);
    let run = Orchestrator::new(stages::default_handlers(), Arc::new(cfg))
        .run(&stage_list, false)
        .await;

    assert_eq!(run.attempted().len(), 1);
    assert_eq!(run.failed_steps, vec!["collect".to_string()]);
    assert!(matches!(
        run.outcome("collect").unwrap().status,
        StageStatus::ExecutionError { .. }
    ));
}
