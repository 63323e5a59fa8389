//! Pipeline orchestration
//!
//! Ordered stages (collect, wrangle, analyze, visualize, model) run one at a
//! time under a wall-clock timeout. Stages hand work to each other only
//! through typed [`ArtifactHandle`]s registered in the [`ArtifactCatalog`],
//! and only after the producing stage returned successfully.
//!
//! Failure routing: a failed critical stage stops the run unless
//! `continue_on_error` is set; any other failure is recorded and the run
//! moves on.

pub mod artifacts;
pub mod orchestrator;
pub mod run_log;
pub mod stages;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StageConfig;

pub use crate::storage::{ArtifactHandle, ArtifactKind};
pub use artifacts::{ArtifactCatalog, ArtifactError, StageContext, StageOutput};
pub use orchestrator::{HandlerRegistry, Orchestrator, StageHandler};
pub use run_log::RunLogWriter;

/// A registered stage. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub id: String,
    pub handler: String,
    pub description: String,
    pub timeout: Duration,
    pub critical: bool,
}

impl PipelineStage {
    pub fn new(id: &str, handler: &str, description: &str, timeout: Duration, critical: bool) -> Self {
        Self {
            id: id.to_string(),
            handler: handler.to_string(),
            description: description.to_string(),
            timeout,
            critical,
        }
    }

    pub fn from_config(cfg: &StageConfig) -> Self {
        Self::new(
            &cfg.id,
            cfg.handler_name(),
            &cfg.description,
            Duration::from_secs(cfg.timeout_secs),
            cfg.critical,
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("no handler registered under '{0}'")]
    NotFound(String),

    #[error("stage exceeded its {}s timeout", .0.as_secs_f64())]
    TimeoutExceeded(Duration),

    #[error("{0}")]
    ExecutionError(String),
}

/// Terminal status of one stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    NotFound,
    TimeoutExceeded,
    ExecutionError { message: String },
}

impl From<&StageError> for StageStatus {
    fn from(err: &StageError) -> Self {
        match err {
            StageError::NotFound(_) => StageStatus::NotFound,
            StageError::TimeoutExceeded(_) => StageStatus::TimeoutExceeded,
            StageError::ExecutionError(msg) => StageStatus::ExecutionError { message: msg.clone() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage_id: String,
    pub description: String,
    pub critical: bool,
    #[serde(flatten)]
    pub status: StageStatus,
    pub elapsed_ms: u64,
    /// Names of the artifacts this stage published.
    pub artifacts: Vec<String>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

/// Record of one orchestrator invocation; persisted as the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub continue_on_error: bool,
    pub outcomes: Vec<StageOutcome>,
    pub failed_steps: Vec<String>,
    pub total_elapsed_ms: u64,
    pub success: bool,
    /// Critical stage that stopped the run early, if any.
    pub aborted_at: Option<String>,
}

impl PipelineRun {
    pub fn new(continue_on_error: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            continue_on_error,
            outcomes: Vec::new(),
            failed_steps: Vec::new(),
            total_elapsed_ms: 0,
            success: false,
            aborted_at: None,
        }
    }

    pub fn outcome(&self, stage_id: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage_id == stage_id)
    }

    pub fn attempted(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.stage_id.as_str()).collect()
    }
}
