//! Job registry and state machine.
//!
//! The registry owns the `job_id -> JobHandle` map behind its own lock,
//! distinct from the per-job locks. Each handle carries the job state
//! behind a `RwLock`, a cancellation watch channel, and a broadcast
//! progress channel. Long-running stages run as spawned tasks behind a
//! bounded semaphore; status queries only ever take short read snapshots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, RwLock, Semaphore};
use tracing::{info, warn};

use jumpcut_models::{
    validate_timeline, Job, JobId, JobState, ProgressEvent, Segment, SegmentKind, Source,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pipeline;

/// Progress events buffered per job; slow subscribers lose the oldest
/// events, never block the publisher.
const EVENT_BUFFER: usize = 64;

/// One input file for a new job.
#[derive(Debug, Clone)]
pub struct SourceInput {
    /// Path to a readable media file
    pub path: PathBuf,
    /// Display name
    pub filename: String,
}

impl SourceInput {
    /// Build from a path, deriving the display name from the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        Self { path, filename }
    }
}

/// Live state of one job inside the registry.
pub(crate) struct JobHandle {
    pub(crate) job: RwLock<Job>,
    pub(crate) cancel_tx: watch::Sender<bool>,
    pub(crate) events: broadcast::Sender<ProgressEvent>,
    /// Merged working media, set once ingestion completes
    pub(crate) media_path: RwLock<Option<PathBuf>>,
    /// Waveform summary, set once analysis completes
    pub(crate) waveform: RwLock<Option<Vec<f32>>>,
    /// Per-job scratch directory, reclaimed at terminal states
    pub(crate) workdir: PathBuf,
}

impl JobHandle {
    fn new(job: Job, workdir: PathBuf) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            job: RwLock::new(job),
            cancel_tx,
            events,
            media_path: RwLock::new(None),
            waveform: RwLock::new(None),
            workdir,
        }
    }

    /// A receiver for the cancellation signal, for passing into ffmpeg runs.
    pub(crate) fn cancel_rx(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Whether cancellation has been requested.
    pub(crate) fn cancel_requested(&self) -> bool {
        *self.cancel_tx.subscribe().borrow()
    }

    /// Publish a progress event; never blocks, drops when nobody listens.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    /// Remove the job's scratch directory.
    pub(crate) async fn cleanup_workdir(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.workdir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(workdir = %self.workdir.display(), error = %e, "Failed to clean workdir");
            }
        }
    }
}

/// Registry of all jobs in this process.
pub struct JobRegistry {
    config: EngineConfig,
    jobs: RwLock<HashMap<JobId, Arc<JobHandle>>>,
    workers: Arc<Semaphore>,
}

impl JobRegistry {
    /// Create a registry with a worker pool sized from the config.
    pub fn new(config: EngineConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            workers,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a job and start ingestion + analysis asynchronously.
    pub async fn create_job(self: &Arc<Self>, inputs: Vec<SourceInput>) -> EngineResult<JobId> {
        if inputs.is_empty() {
            return Err(EngineError::invalid_input("no sources given"));
        }

        let job = Job::new();
        let job_id = job.id.clone();
        let workdir = self.config.work_dir.join(job_id.as_str());
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| EngineError::processing("ingest", e.to_string()))?;

        let handle = Arc::new(JobHandle::new(job, workdir));
        self.jobs
            .write()
            .await
            .insert(job_id.clone(), Arc::clone(&handle));

        info!(job_id = %job_id, inputs = inputs.len(), "Job created");
        handle.emit(ProgressEvent::new(
            job_id.clone(),
            jumpcut_models::ProgressStep::Initializing,
            0.0,
        ));

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&registry.workers).acquire_owned().await else {
                return;
            };
            pipeline::run_analysis(registry.config.clone(), handle, inputs).await;
        });

        Ok(job_id)
    }

    /// Request cancellation; idempotent, no-op once terminal.
    ///
    /// A running stage observes the flag at its next checkpoint. A job
    /// idle in `TimelineReady` has no stage to observe it and transitions
    /// to `Cancelled` directly.
    pub async fn request_cancel(&self, job_id: &JobId) -> EngineResult<()> {
        let handle = self.get(job_id).await?;
        let mut job = handle.job.write().await;
        if job.state.is_terminal() {
            return Ok(());
        }

        job.cancel_requested = true;
        let _ = handle.cancel_tx.send(true);
        info!(job_id = %job_id, state = job.state.as_str(), "Cancellation requested");

        if job.state == JobState::TimelineReady {
            job.transition(JobState::Cancelled);
            drop(job);
            handle.emit(ProgressEvent::cancelled(job_id.clone()));
            handle.cleanup_workdir().await;
        }
        Ok(())
    }

    /// Read-only snapshot of a job.
    pub async fn get_status(&self, job_id: &JobId) -> EngineResult<Job> {
        let handle = self.get(job_id).await?;
        let job = handle.job.read().await;
        Ok(job.clone())
    }

    /// Duration, sources and segments, once analysis has completed.
    pub async fn get_timeline(
        &self,
        job_id: &JobId,
    ) -> EngineResult<(f64, Vec<Source>, Vec<Segment>)> {
        let handle = self.get(job_id).await?;
        let job = handle.job.read().await;
        if !job.state.timeline_available() {
            return Err(EngineError::NotReady(format!(
                "timeline not available in state {}",
                job.state.as_str()
            )));
        }
        Ok((job.duration, job.sources.clone(), job.timeline.clone()))
    }

    /// Waveform summary, once analysis has completed.
    pub async fn get_waveform(&self, job_id: &JobId) -> EngineResult<Vec<f32>> {
        let handle = self.get(job_id).await?;
        {
            let job = handle.job.read().await;
            if !job.state.timeline_available() {
                return Err(EngineError::NotReady(format!(
                    "waveform not available in state {}",
                    job.state.as_str()
                )));
            }
        }
        let waveform = handle.waveform.read().await.clone().unwrap_or_default();
        Ok(waveform)
    }

    /// Atomically replace the timeline with an edited segment list.
    pub async fn submit_edit(&self, job_id: &JobId, segments: Vec<Segment>) -> EngineResult<()> {
        let handle = self.get(job_id).await?;
        let mut job = handle.job.write().await;

        match job.state {
            JobState::TimelineReady => {}
            state if !state.timeline_available() => {
                return Err(EngineError::NotReady(format!(
                    "cannot edit timeline in state {}",
                    state.as_str()
                )));
            }
            state => {
                return Err(EngineError::InvalidState(format!(
                    "cannot edit timeline in state {}",
                    state.as_str()
                )));
            }
        }

        validate_timeline(&segments, job.duration)
            .map_err(|e| EngineError::InvalidTimeline(e.to_string()))?;

        job.timeline = segments;
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Start rendering from a snapshot of the current timeline.
    ///
    /// Edits submitted after this call do not affect the in-flight render.
    pub async fn start_render(self: &Arc<Self>, job_id: &JobId) -> EngineResult<()> {
        let handle = self.get(job_id).await?;
        let snapshot = {
            let mut job = handle.job.write().await;
            if job.state != JobState::TimelineReady {
                return Err(EngineError::InvalidState(format!(
                    "render requires timeline_ready, job is {}",
                    job.state.as_str()
                )));
            }
            if !job.timeline.iter().any(|s| s.kind == SegmentKind::Keep) {
                return Err(EngineError::InvalidTimeline(
                    "timeline has no keep segments".to_string(),
                ));
            }
            job.transition(JobState::Rendering);
            job.timeline.clone()
        };

        handle.emit(ProgressEvent::new(
            job_id.clone(),
            jumpcut_models::ProgressStep::Rendering,
            50.0,
        ));

        let registry = Arc::clone(self);
        let handle_clone = Arc::clone(&handle);
        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&registry.workers).acquire_owned().await else {
                return;
            };
            pipeline::run_render(registry.config.clone(), handle_clone, snapshot).await;
        });

        Ok(())
    }

    /// Subscribe to the job's progress stream.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> EngineResult<broadcast::Receiver<ProgressEvent>> {
        let handle = self.get(job_id).await?;
        Ok(handle.events.subscribe())
    }

    /// Path of the rendered artifact, once complete.
    pub async fn artifact_path(&self, job_id: &JobId) -> EngineResult<PathBuf> {
        let handle = self.get(job_id).await?;
        let job = handle.job.read().await;
        if job.state != JobState::Complete {
            return Err(EngineError::not_found(format!(
                "no artifact for job {} in state {}",
                job_id,
                job.state.as_str()
            )));
        }
        job.output_path
            .clone()
            .ok_or_else(|| EngineError::not_found(format!("no artifact for job {}", job_id)))
    }

    async fn get(&self, job_id: &JobId) -> EngineResult<Arc<JobHandle>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("job {}", job_id)))
    }

    /// Insert a handle for tests that need a job in a specific state.
    #[cfg(test)]
    pub(crate) async fn insert_for_test(
        &self,
        job: Job,
        workdir: &std::path::Path,
    ) -> Arc<JobHandle> {
        let id = job.id.clone();
        let handle = Arc::new(JobHandle::new(job, workdir.to_path_buf()));
        self.jobs.write().await.insert(id, Arc::clone(&handle));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumpcut_models::ProgressStep;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(dir: &tempfile::TempDir) -> EngineConfig {
        EngineConfig {
            upload_dir: dir.path().join("uploads"),
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("outputs"),
            ..EngineConfig::default()
        }
    }

    async fn registry(dir: &tempfile::TempDir) -> Arc<JobRegistry> {
        let config = test_config(dir);
        config.ensure_dirs().await.unwrap();
        Arc::new(JobRegistry::new(config))
    }

    fn ready_job(duration: f64) -> Job {
        let mut job = Job::new();
        job.duration = duration;
        job.sources = vec![Source::new("input.mp4", 0.0, duration)];
        job.timeline = vec![
            Segment::keep(0.0, duration / 2.0),
            Segment::cut(duration / 2.0, duration),
        ];
        job.transition(JobState::TimelineReady);
        job
    }

    #[tokio::test]
    async fn test_create_job_empty_sources_rejected() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let result = registry.create_job(Vec::new()).await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_not_found() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let bogus = JobId::new();
        assert!(matches!(
            registry.get_status(&bogus).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            registry.request_cancel(&bogus).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timeline_not_ready_before_analysis() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let mut job = Job::new();
        job.transition(JobState::Analyzing);
        let id = job.id.clone();
        registry.insert_for_test(job, dir.path()).await;

        assert!(matches!(
            registry.get_timeline(&id).await,
            Err(EngineError::NotReady(_))
        ));
        assert!(matches!(
            registry.get_waveform(&id).await,
            Err(EngineError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_edit_validates_invariant() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let job = ready_job(10.0);
        let id = job.id.clone();
        registry.insert_for_test(job, dir.path()).await;

        // Gap between segments
        let bad = vec![Segment::keep(0.0, 4.0), Segment::cut(5.0, 10.0)];
        assert!(matches!(
            registry.submit_edit(&id, bad).await,
            Err(EngineError::InvalidTimeline(_))
        ));

        // Wrong total span
        let bad = vec![Segment::keep(0.0, 9.0)];
        assert!(matches!(
            registry.submit_edit(&id, bad).await,
            Err(EngineError::InvalidTimeline(_))
        ));

        let good = vec![
            Segment::cut(0.0, 2.0),
            Segment::keep(2.0, 8.0),
            Segment::cut(8.0, 10.0),
        ];
        registry.submit_edit(&id, good.clone()).await.unwrap();
        let (_, _, timeline) = registry.get_timeline(&id).await.unwrap();
        assert_eq!(timeline, good);
    }

    #[tokio::test]
    async fn test_submit_edit_rejected_before_ready() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let mut job = Job::new();
        job.duration = 10.0;
        job.transition(JobState::Analyzing);
        let id = job.id.clone();
        registry.insert_for_test(job, dir.path()).await;

        let segments = vec![Segment::keep(0.0, 10.0)];
        assert!(matches!(
            registry.submit_edit(&id, segments).await,
            Err(EngineError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_render_requires_timeline_ready() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let mut job = Job::new();
        job.transition(JobState::Analyzing);
        let id = job.id.clone();
        registry.insert_for_test(job, dir.path()).await;

        assert!(matches!(
            registry.start_render(&id).await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_render_rejects_all_cut_timeline() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let mut job = ready_job(10.0);
        job.timeline = vec![Segment::cut(0.0, 10.0)];
        let id = job.id.clone();
        registry.insert_for_test(job, dir.path()).await;

        assert!(matches!(
            registry.start_render(&id).await,
            Err(EngineError::InvalidTimeline(_))
        ));
        // Rejection leaves the job editable
        assert_eq!(
            registry.get_status(&id).await.unwrap().state,
            JobState::TimelineReady
        );
    }

    #[tokio::test]
    async fn test_cancel_idle_job_is_idempotent() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let job = ready_job(10.0);
        let id = job.id.clone();
        let handle = registry.insert_for_test(job, dir.path()).await;
        let mut events = handle.events.subscribe();

        registry.request_cancel(&id).await.unwrap();
        let status = registry.get_status(&id).await.unwrap();
        assert_eq!(status.state, JobState::Cancelled);
        assert!(status.cancel_requested);

        // Second cancel: same observable effect, no extra transition
        registry.request_cancel(&id).await.unwrap();
        assert_eq!(
            registry.get_status(&id).await.unwrap().state,
            JobState::Cancelled
        );

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.step, ProgressStep::Cancelled);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_cancel_during_stage_sets_flag_only() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let mut job = Job::new();
        job.transition(JobState::Rendering);
        let id = job.id.clone();
        let handle = registry.insert_for_test(job, dir.path()).await;

        registry.request_cancel(&id).await.unwrap();
        // The running stage owns the transition; the registry only flags
        let status = registry.get_status(&id).await.unwrap();
        assert_eq!(status.state, JobState::Rendering);
        assert!(status.cancel_requested);
        assert!(handle.cancel_requested());
    }

    #[tokio::test]
    async fn test_artifact_only_when_complete() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let job = ready_job(10.0);
        let id = job.id.clone();
        let handle = registry.insert_for_test(job, dir.path()).await;

        assert!(matches!(
            registry.artifact_path(&id).await,
            Err(EngineError::NotFound(_))
        ));

        {
            let mut job = handle.job.write().await;
            job.output_path = Some(dir.path().join("final.mp4"));
            job.transition(JobState::Complete);
        }
        let path = registry.artifact_path(&id).await.unwrap();
        assert_eq!(path, dir.path().join("final.mp4"));
    }

    #[tokio::test]
    async fn test_create_job_with_unreadable_source_goes_error() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;

        let missing = dir.path().join("does-not-exist.mp4");
        let id = registry
            .create_job(vec![SourceInput::from_path(missing)])
            .await
            .unwrap();

        // The spawned analysis task may finish before a subscriber attaches,
        // so poll the snapshot rather than the event stream
        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = registry.get_status(&id).await.unwrap();
                if status.state.is_terminal() {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(status.state, JobState::Error);
        assert!(status
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("does-not-exist.mp4"));
    }

    #[tokio::test]
    async fn test_get_status_returns_snapshot() {
        let dir = tempdir().unwrap();
        let registry = registry(&dir).await;
        let job = ready_job(10.0);
        let id = job.id.clone();
        registry.insert_for_test(job, dir.path()).await;

        let mut snapshot = registry.get_status(&id).await.unwrap();
        snapshot.duration = 999.0;
        // Mutating the snapshot does not touch the registry's job
        let fresh = registry.get_status(&id).await.unwrap();
        assert!((fresh.duration - 10.0).abs() < f64::EPSILON);
    }
}
