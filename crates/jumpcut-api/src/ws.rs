//! WebSocket progress streaming with backpressure support.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use jumpcut_engine::JobRegistry;
use jumpcut_models::{Job, JobId, JobState, ProgressEvent};

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Send a WebSocket message with backpressure handling.
async fn send_ws_message(tx: &mpsc::Sender<Message>, event: &ProgressEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json.clone())) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            // Channel full - apply backpressure by blocking
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(Message::Text(json)).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Synthesize the terminal event for a job that finished before the
/// subscriber connected.
fn terminal_event(job: &Job) -> Option<ProgressEvent> {
    match job.state {
        JobState::Complete => {
            let output = job
                .output_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Some(ProgressEvent::complete(job.id.clone(), output))
        }
        JobState::Error => Some(ProgressEvent::error(
            job.id.clone(),
            job.error.clone().unwrap_or_else(|| "unknown error".to_string()),
        )),
        JobState::Cancelled => Some(ProgressEvent::cancelled(job.id.clone())),
        _ => None,
    }
}

/// Attach to a job's progress stream: a receiver plus a state snapshot.
///
/// The receiver is created before the snapshot is taken, so a terminal
/// transition can never fall between them unobserved: it is either
/// already visible in the snapshot (replayed via [`terminal_event`]) or
/// queued on the receiver.
async fn attach_job_stream(
    registry: &JobRegistry,
    job_id: &JobId,
) -> Result<(Job, broadcast::Receiver<ProgressEvent>), ApiError> {
    let events = registry.subscribe(job_id).await?;
    let job = registry.get_status(job_id).await?;
    Ok((job, events))
}

/// Subscribe to a job's progress stream.
///
/// GET /ws/jobs/:id
pub async fn ws_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from_string(job_id);
    let (job, events) = attach_job_stream(&state.registry, &job_id).await?;

    Ok(ws.on_upgrade(move |socket| handle_progress_socket(socket, job, events)))
}

async fn handle_progress_socket(
    socket: WebSocket,
    job: Job,
    mut events: broadcast::Receiver<ProgressEvent>,
) {
    metrics::record_ws_connection();
    let active = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(active);
    info!(job_id = %job.id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    // Writer task: drains the buffered channel into the socket
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let job_id = job.id.clone();

    // A job that was already terminal gets its terminal event replayed
    if let Some(event) = terminal_event(&job) {
        if send_ws_message(&tx, &event).await {
            metrics::record_ws_event_sent(event.step.as_str());
        }
    } else {
        let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                result = events.recv() => match result {
                    Ok(event) => {
                        let terminal = event.step.is_terminal();
                        if !send_ws_message(&tx, &event).await {
                            break;
                        }
                        metrics::record_ws_event_sent(event.step.as_str());
                        if terminal {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(job_id = %job_id, skipped, "Progress subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = stream.next() => match incoming {
                    // Client messages are ignored; closure ends the stream
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                _ = heartbeat.tick() => {
                    if tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    drop(tx);
    let _ = writer.await;

    let active = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
    metrics::set_ws_active_connections(active);
    info!(job_id = %job_id, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use jumpcut_engine::{EngineConfig, SourceInput};
    use jumpcut_models::ProgressStep;

    /// A job may reach a terminal state at any point while a client is
    /// attaching. Whichever side of the snapshot the transition lands on,
    /// the subscriber must still observe the terminal event.
    #[tokio::test]
    async fn test_attach_never_misses_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            upload_dir: dir.path().join("uploads"),
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("outputs"),
            ..Default::default()
        };
        let registry = Arc::new(JobRegistry::new(config));

        // Unreadable input makes the analysis stage fail quickly, racing
        // the attach below
        let job_id = registry
            .create_job(vec![SourceInput::from_path("/no/such/input.mp4")])
            .await
            .unwrap();

        let (job, mut events) = attach_job_stream(&registry, &job_id).await.unwrap();

        if let Some(event) = terminal_event(&job) {
            // Transition landed before the snapshot; the replay path fires
            assert!(event.step.is_terminal());
            return;
        }

        // Otherwise the receiver predates the transition and must yield it
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(event) if event.step.is_terminal() => break event,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("stream closed without a terminal event")
                    }
                }
            }
        })
        .await
        .expect("no terminal event observed");
        assert_eq!(event.step, ProgressStep::Error);
    }

    #[test]
    fn test_terminal_event_for_completed_job() {
        let mut job = Job::new();
        job.output_path = Some(std::path::PathBuf::from("/outputs/abc_final.mp4"));
        job.transition(JobState::Complete);

        let event = terminal_event(&job).unwrap();
        assert_eq!(event.step, ProgressStep::Complete);
        assert_eq!(event.output_file.as_deref(), Some("abc_final.mp4"));
    }

    #[test]
    fn test_terminal_event_for_failed_job() {
        let mut job = Job::new();
        job.error = Some("ffmpeg exited".to_string());
        job.transition(JobState::Error);

        let event = terminal_event(&job).unwrap();
        assert_eq!(event.step, ProgressStep::Error);
        assert_eq!(event.message.as_deref(), Some("ffmpeg exited"));
    }

    #[test]
    fn test_no_terminal_event_while_running() {
        let mut job = Job::new();
        job.transition(JobState::Analyzing);
        assert!(terminal_event(&job).is_none());

        job.transition(JobState::TimelineReady);
        assert!(terminal_event(&job).is_none());
    }
}
