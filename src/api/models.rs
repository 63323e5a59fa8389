use axum::extract::State;

use super::response::ApiResponse;
use crate::app_state::AppState;
use crate::ml::registry::ComparisonRow;

/// GET /api/v1/models/comparison
///
/// The ranked comparison table of the last training run, or an empty list
/// when none has been written.
pub async fn comparison(State(state): State<AppState>) -> ApiResponse<Vec<ComparisonRow>> {
    let registry = state.registry.clone();
    let rows = match tokio::task::spawn_blocking(move || registry.load_comparison()).await {
        Ok(Ok(table)) => table.rows,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "model comparison unavailable");
            Vec::new()
        }
        Err(e) => {
            tracing::error!(error = %e, "model comparison worker failed");
            Vec::new()
        }
    };
    let count = rows.len();
    ApiResponse::success(rows).with_count(count)
}
