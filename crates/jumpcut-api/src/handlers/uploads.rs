//! Chunked upload handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitUploadRequest {
    pub filename: String,
    pub size: u64,
}

#[derive(Serialize)]
pub struct InitUploadResponse {
    pub upload_id: String,
}

/// Start a chunked upload session.
///
/// POST /api/uploads
pub async fn init_upload(
    State(state): State<AppState>,
    Json(request): Json<InitUploadRequest>,
) -> ApiResult<(StatusCode, Json<InitUploadResponse>)> {
    let upload_id = state.uploads.init(&request.filename, request.size).await?;
    Ok((
        StatusCode::CREATED,
        Json(InitUploadResponse { upload_id }),
    ))
}

#[derive(Serialize)]
pub struct ChunkResponse {
    pub received: u64,
}

/// Append a raw-body chunk to an upload session.
///
/// POST /api/uploads/:id/chunk
pub async fn append_chunk(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ChunkResponse>> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Empty chunk"));
    }

    let received = state.uploads.append(&upload_id, &body).await?;
    metrics::record_upload_chunk(body.len());
    debug!(upload_id = %upload_id, chunk = body.len(), received, "Chunk appended");
    Ok(Json(ChunkResponse { received }))
}

#[derive(Serialize)]
pub struct CompleteUploadResponse {
    pub path: String,
    pub filename: String,
    pub size: u64,
}

/// Complete an upload session; fails unless byte counts match exactly.
///
/// POST /api/uploads/:id/complete
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let session = state.uploads.finalize(&upload_id).await?;
    Ok(Json(CompleteUploadResponse {
        path: session.path.display().to_string(),
        filename: session.filename,
        size: session.bytes_received,
    }))
}
