//! API routes.

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::jobs::{
    cancel_job, create_job, get_artifact, get_job, get_timeline, get_waveform, put_timeline,
    start_render,
};
use crate::handlers::uploads::{append_chunk, complete_upload, init_upload};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;
use crate::ws::ws_job_progress;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/jobs/:job_id/timeline", get(get_timeline))
        .route("/jobs/:job_id/timeline", put(put_timeline))
        .route("/jobs/:job_id/waveform", get(get_waveform))
        .route("/jobs/:job_id/render", post(start_render))
        .route("/jobs/:job_id/artifact", get(get_artifact));

    // Chunk bodies arrive raw; the shared body limit is sized for them
    let upload_routes = Router::new()
        .route("/uploads", post(init_upload))
        .route("/uploads/:upload_id/chunk", post(append_chunk))
        .route("/uploads/:upload_id/complete", post(complete_upload));

    let api_routes = Router::new().merge(job_routes).merge(upload_routes);

    let ws_routes = Router::new().route("/ws/jobs/:job_id", get(ws_job_progress));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
