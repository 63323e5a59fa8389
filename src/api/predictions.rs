use axum::extract::{rejection::QueryRejection, Query, State};
use serde::Deserialize;

use super::response::ApiResponse;
use crate::app_state::AppState;
use crate::serving::GeoPrediction;

pub const MAX_LIMIT: usize = 1000;

/// Raw query parameters. Values are kept as text so a malformed one is
/// ignored rather than failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PredictionQuery {
    pub country: Option<String>,
    pub limit: Option<String>,
}

impl PredictionQuery {
    /// Requested limit, or the configured default when absent or not a
    /// number, clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self, default_limit: usize) -> usize {
        let requested = self.limit.as_deref().and_then(|raw| match raw.trim().parse::<usize>() {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::debug!(limit = raw, error = %e, "unparsable limit ignored");
                None
            }
        });
        requested.unwrap_or(default_limit).clamp(1, MAX_LIMIT)
    }
}

/// GET /api/v1/predictions?country=<name>&limit=<n>
///
/// Rows are ordered by peak demand, highest first.
pub async fn list_predictions(
    State(state): State<AppState>,
    query: Result<Query<PredictionQuery>, QueryRejection>,
) -> ApiResponse<Vec<GeoPrediction>> {
    let query = query.map(|Query(q)| q).unwrap_or_else(|rejection| {
        tracing::debug!(error = %rejection, "query string ignored");
        PredictionQuery::default()
    });
    let limit = query.effective_limit(state.cfg.serving.default_limit);
    let set = state.predictions(query.country.clone()).await;

    let mut rows: Vec<GeoPrediction> = set.predictions.as_ref().clone();
    rows.sort_by(|a, b| b.peak_demand.cmp(&a.peak_demand).then_with(|| a.entity.cmp(&b.entity)));
    let total = rows.len();
    rows.truncate(limit);

    tracing::debug!(
        country = ?query.country,
        limit,
        total,
        version = %set.batch_version,
        "predictions served"
    );
    ApiResponse::success(rows)
        .with_count(total)
        .with_batch_version(set.batch_version)
}
