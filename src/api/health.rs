use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::app_state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    model: ComponentHealth,
    forecast: ComponentHealth,
}

/// Health status of a component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ComponentHealth {
    fn healthy(detail: Option<String>) -> Self {
        Self {
            status: "healthy",
            detail,
        }
    }

    fn degraded(detail: String) -> Self {
        Self {
            status: "degraded",
            detail: Some(detail),
        }
    }
}

/// GET /health
///
/// Always 200: a missing model or forecast only degrades the service to
/// fallback or sample predictions.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let model = match (&state.artifact, &state.artifact_error) {
        (Some(artifact), _) => ComponentHealth::healthy(Some(artifact.metrics.model_name.clone())),
        (None, Some(e)) => ComponentHealth::degraded(e.clone()),
        (None, None) => ComponentHealth::degraded("no model artifact".to_string()),
    };

    let forecast_path = &state.cfg.serving.forecast_dataset;
    let forecast = match tokio::fs::try_exists(forecast_path).await {
        Ok(true) => ComponentHealth::healthy(None),
        Ok(false) => ComponentHealth::degraded(format!("{} not found", forecast_path.display())),
        Err(e) => ComponentHealth::degraded(e.to_string()),
    };

    let status = if model.status == "healthy" && forecast.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        timestamp: chrono::Utc::now(),
        checks: HealthChecks { model, forecast },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_health() {
        let ok = ComponentHealth::healthy(None);
        assert_eq!(ok.status, "healthy");
        assert!(ok.detail.is_none());

        let degraded = ComponentHealth::degraded("model artifact not found".to_string());
        assert_eq!(degraded.status, "degraded");
        assert_eq!(degraded.detail.as_deref(), Some("model artifact not found"));
    }
}
