//! Axum HTTP API server.
//!
//! This crate provides:
//! - REST endpoints for jobs, timelines and chunked uploads
//! - WebSocket progress streaming per job
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
