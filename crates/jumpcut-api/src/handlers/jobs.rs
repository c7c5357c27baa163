//! Job lifecycle handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

use jumpcut_engine::SourceInput;
use jumpcut_models::{Job, JobId, Segment, Source};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Create job request: direct local paths and/or finished upload sessions.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub upload_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

/// Create a job from local paths and/or completed uploads.
///
/// POST /api/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let mut inputs: Vec<SourceInput> = Vec::new();

    // Upload sessions must be byte-complete before they become job inputs
    for upload_id in &request.upload_ids {
        let session = state.uploads.finalize(upload_id).await?;
        inputs.push(SourceInput {
            path: session.path,
            filename: session.filename,
        });
    }

    for path in &request.paths {
        inputs.push(SourceInput::from_path(path));
    }

    let source_count = inputs.len();
    let job_id = state.registry.create_job(inputs).await?;
    metrics::record_job_created(source_count);
    info!(job_id = %job_id, sources = source_count, "Job accepted");

    Ok((StatusCode::CREATED, Json(CreateJobResponse { job_id })))
}

#[derive(Serialize)]
pub struct AckResponse {
    pub status: String,
}

/// Request cancellation of a job (idempotent).
///
/// POST /api/jobs/:id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    let job_id = JobId::from_string(job_id);
    state.registry.request_cancel(&job_id).await?;
    metrics::record_job_cancelled();
    Ok(Json(AckResponse {
        status: "cancel_requested".to_string(),
    }))
}

/// Get a job snapshot.
///
/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state
        .registry
        .get_status(&JobId::from_string(job_id))
        .await?;
    Ok(Json(job))
}

#[derive(Serialize)]
pub struct TimelineResponse {
    pub duration: f64,
    pub sources: Vec<Source>,
    pub segments: Vec<Segment>,
}

/// Get the editable timeline.
///
/// GET /api/jobs/:id/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<TimelineResponse>> {
    let (duration, sources, segments) = state
        .registry
        .get_timeline(&JobId::from_string(job_id))
        .await?;
    Ok(Json(TimelineResponse {
        duration,
        sources,
        segments,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTimelineRequest {
    pub segments: Vec<Segment>,
}

/// Replace the timeline with an edited segment list.
///
/// PUT /api/jobs/:id/timeline
pub async fn put_timeline(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<UpdateTimelineRequest>,
) -> ApiResult<Json<AckResponse>> {
    state
        .registry
        .submit_edit(&JobId::from_string(job_id), request.segments)
        .await?;
    Ok(Json(AckResponse {
        status: "updated".to_string(),
    }))
}

#[derive(Serialize)]
pub struct WaveformResponse {
    pub waveform: Vec<f32>,
}

/// Get the waveform summary.
///
/// GET /api/jobs/:id/waveform
pub async fn get_waveform(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<WaveformResponse>> {
    let waveform = state
        .registry
        .get_waveform(&JobId::from_string(job_id))
        .await?;
    Ok(Json(WaveformResponse { waveform }))
}

/// Start rendering the current timeline.
///
/// POST /api/jobs/:id/render
pub async fn start_render(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<AckResponse>)> {
    state
        .registry
        .start_render(&JobId::from_string(job_id))
        .await?;
    metrics::record_render_started();
    Ok((
        StatusCode::ACCEPTED,
        Json(AckResponse {
            status: "rendering".to_string(),
        }),
    ))
}

/// Download the rendered artifact.
///
/// GET /api/jobs/:id/artifact
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let path = state
        .registry
        .artifact_path(&JobId::from_string(job_id))
        .await?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("Artifact file missing"))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stat artifact: {}", e)))?
        .len();

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output.mp4".to_string());

    let body = Body::from_stream(ReaderStream::new(file));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
