use axum::extract::State;

use super::error::ApiError;
use super::response::ApiResponse;
use crate::app_state::AppState;
use crate::pipeline::{PipelineRun, RunLogWriter};

/// GET /api/v1/pipeline/latest
pub async fn latest_run(State(state): State<AppState>) -> Result<ApiResponse<PipelineRun>, ApiError> {
    let logs_dir = state.cfg.paths.logs_dir.clone();
    let latest = tokio::task::spawn_blocking(move || RunLogWriter::read_latest(&logs_dir))
        .await??;

    latest
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::NotFound("no pipeline run recorded".to_string()))
}
