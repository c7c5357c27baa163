//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "jumpcut_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "jumpcut_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "jumpcut_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "jumpcut_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "jumpcut_ws_connections_active";
    pub const WS_EVENTS_SENT: &str = "jumpcut_ws_events_sent_total";

    // Job metrics
    pub const JOBS_CREATED_TOTAL: &str = "jumpcut_jobs_created_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "jumpcut_jobs_cancelled_total";
    pub const RENDERS_STARTED_TOTAL: &str = "jumpcut_renders_started_total";

    // Upload metrics
    pub const UPLOAD_CHUNKS_TOTAL: &str = "jumpcut_upload_chunks_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "jumpcut_upload_bytes_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record a progress event forwarded over WebSocket.
pub fn record_ws_event_sent(step: &str) {
    let labels = [("step", step.to_string())];
    counter!(names::WS_EVENTS_SENT, &labels).increment(1);
}

/// Record job created.
pub fn record_job_created(source_count: usize) {
    let labels = [(
        "sources",
        if source_count > 1 { "multi" } else { "single" }.to_string(),
    )];
    counter!(names::JOBS_CREATED_TOTAL, &labels).increment(1);
}

/// Record job cancelled.
pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

/// Record render started.
pub fn record_render_started() {
    counter!(names::RENDERS_STARTED_TOTAL).increment(1);
}

/// Record an uploaded chunk.
pub fn record_upload_chunk(bytes: usize) {
    counter!(names::UPLOAD_CHUNKS_TOTAL).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes as u64);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .unwrap()
    .replace_all(path, ":id");
    let path = regex_lite::Regex::new(r"/[0-9]+(/|$)")
        .unwrap()
        .replace_all(&path, "/:id$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();
    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000/timeline"),
            "/api/jobs/:id/timeline"
        );
        assert_eq!(sanitize_path("/api/jobs/42"), "/api/jobs/:id");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
