use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::artifacts::{ArtifactCatalog, StageContext, StageOutput};
use super::run_log::RunLogWriter;
use super::{PipelineRun, PipelineStage, StageError, StageOutcome, StageStatus};
use crate::config::Config;

/// Work behind a pipeline stage.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(&self, ctx: StageContext) -> anyhow::Result<StageOutput>;
}

/// Handlers by name. Stages refer to handlers by name so a misconfigured
/// stage list fails as `NotFound` instead of at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn StageHandler>) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

pub struct Orchestrator {
    registry: HandlerRegistry,
    catalog: Arc<ArtifactCatalog>,
    config: Arc<Config>,
    run_log: Option<RunLogWriter>,
}

impl Orchestrator {
    pub fn new(registry: HandlerRegistry, config: Arc<Config>) -> Self {
        Self {
            registry,
            catalog: Arc::new(ArtifactCatalog::new()),
            config,
            run_log: None,
        }
    }

    pub fn with_run_log(mut self, writer: RunLogWriter) -> Self {
        self.run_log = Some(writer);
        self
    }

    pub fn catalog(&self) -> &Arc<ArtifactCatalog> {
        &self.catalog
    }

    /// Runs `stages` in order. Never fails: every fault ends up in the
    /// returned run.
    pub async fn run(&self, stages: &[PipelineStage], continue_on_error: bool) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun::new(continue_on_error);
        info!(run_id = %run.run_id, stages = stages.len(), continue_on_error, "pipeline run started");

        for (idx, stage) in stages.iter().enumerate() {
            let stage_started = Instant::now();
            let result = self.execute(stage).await;
            let elapsed_ms = stage_started.elapsed().as_millis() as u64;

            let (status, artifacts) = match result {
                Ok(output) => {
                    let names: Vec<String> = output
                        .handles
                        .into_iter()
                        .map(|h| self.catalog.publish(&stage.id, h))
                        .collect();
                    info!(stage = %stage.id, elapsed_ms, "stage succeeded");
                    (StageStatus::Succeeded, names)
                }
                Err(err) => {
                    if stage.critical {
                        error!(stage = %stage.id, elapsed_ms, error = %err, "critical stage failed");
                    } else {
                        warn!(stage = %stage.id, elapsed_ms, error = %err, "stage failed");
                    }
                    (StageStatus::from(&err), Vec::new())
                }
            };

            let failed = status != StageStatus::Succeeded;
            run.outcomes.push(StageOutcome {
                stage_id: stage.id.clone(),
                description: stage.description.clone(),
                critical: stage.critical,
                status,
                elapsed_ms,
                artifacts,
            });

            if failed {
                run.failed_steps.push(stage.id.clone());
                if stage.critical && !continue_on_error {
                    run.aborted_at = Some(stage.id.clone());
                    warn!(stage = %stage.id, "critical failure, aborting run");
                    break;
                }
            }

            if idx + 1 < stages.len() {
                let released = self.catalog.reclaim();
                tracing::debug!(stage = %stage.id, released_bytes = released, "cached tables reclaimed");
            }
        }

        run.success = run.outcomes.iter().all(StageOutcome::succeeded);
        run.total_elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %run.run_id,
            success = run.success,
            failed = ?run.failed_steps,
            total_elapsed_ms = run.total_elapsed_ms,
            "pipeline run finished"
        );

        if let Some(writer) = &self.run_log {
            match writer.persist(&run) {
                Ok(path) => info!(path = %path.display(), "run log written"),
                Err(e) => error!(error = %e, "failed to write run log"),
            }
        }
        run
    }

    async fn execute(&self, stage: &PipelineStage) -> Result<StageOutput, StageError> {
        let handler = self
            .registry
            .get(&stage.handler)
            .ok_or_else(|| StageError::NotFound(stage.handler.clone()))?;

        let cancel = CancellationToken::new();
        let ctx = StageContext {
            stage_id: stage.id.clone(),
            catalog: Arc::clone(&self.catalog),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
        };

        info!(stage = %stage.id, handler = %stage.handler, timeout_secs = stage.timeout.as_secs(), "stage started");
        let mut task = tokio::spawn(async move { handler.run(ctx).await });

        match tokio::time::timeout(stage.timeout, &mut task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(StageError::ExecutionError(format!("{e:#}"))),
            Ok(Err(join_err)) if join_err.is_panic() => Err(StageError::ExecutionError(format!(
                "stage panicked: {}",
                panic_message(join_err.into_panic())
            ))),
            Ok(Err(join_err)) => Err(StageError::ExecutionError(join_err.to_string())),
            Err(_) => {
                cancel.cancel();
                task.abort();
                Err(StageError::TimeoutExceeded(stage.timeout))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
