pub mod error;
pub mod health;
pub mod models;
pub mod pipeline;
pub mod predictions;
pub mod response;

use axum::{routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{app_state::AppState, config::Config};

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/predictions", get(predictions::list_predictions))
        .route("/models/comparison", get(models::comparison))
        .route("/pipeline/latest", get(pipeline::latest_run))
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", v1_router())
        .with_state(state);

    if cfg.server.enable_cors {
        let cors = match cfg.server.cors_origin.parse() {
            Ok(origin) => CorsLayer::new().allow_origin(tower_http::cors::AllowOrigin::exact(origin)),
            Err(e) => {
                tracing::warn!(origin = %cfg.server.cors_origin, error = %e, "invalid CORS origin, allowing any");
                CorsLayer::new().allow_origin(tower_http::cors::Any)
            }
        }
        .allow_methods([axum::http::Method::GET])
        .allow_headers([axum::http::header::CONTENT_TYPE]);
        router = router.layer(cors);
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}
