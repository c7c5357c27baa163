//! Ingestion, analysis and render stages.
//!
//! Stages run as spawned tasks and report outcomes by mutating the job
//! behind its lock and emitting progress events. Progress maps onto one
//! job-wide 0-100 scale: ingestion and audio extraction cover 0-20, VAD
//! scoring 20-50, rendering 50-100. Cancellation is observed between
//! inputs, between VAD frame batches, and inside every ffmpeg run.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use jumpcut_media::{
    compute_waveform, extract_analysis_audio, load_audio_samples, merge_media, probe_media,
    render_timeline, segments_from_probabilities, MediaError, SileroVad, VAD_SAMPLE_RATE,
};
use jumpcut_models::{segment::round_ms, JobId, JobState, ProgressEvent, ProgressStep, Source};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::registry::{JobHandle, SourceInput};

/// VAD frames scored between cancellation checks (~4s of audio at 16kHz).
const VAD_BATCH_FRAMES: usize = 128;

/// Run ingestion and analysis, leaving the job in `TimelineReady` on
/// success or a terminal state otherwise.
pub(crate) async fn run_analysis(
    config: EngineConfig,
    handle: Arc<JobHandle>,
    inputs: Vec<SourceInput>,
) {
    let job_id = handle.job.read().await.id.clone();
    match analyze(&config, &handle, &job_id, inputs).await {
        Ok(()) => {
            {
                let mut job = handle.job.write().await;
                job.transition(JobState::TimelineReady);
            }
            info!(job_id = %job_id, "Analysis complete");
            handle.emit(ProgressEvent::new(
                job_id,
                ProgressStep::AnalysisComplete,
                50.0,
            ));
        }
        Err(EngineError::Cancelled) => finish_cancelled(&handle, &job_id).await,
        Err(e) => finish_error(&handle, &job_id, e).await,
    }
}

/// Run the render stage from a timeline snapshot.
pub(crate) async fn run_render(
    config: EngineConfig,
    handle: Arc<JobHandle>,
    segments: Vec<jumpcut_models::Segment>,
) {
    let job_id = handle.job.read().await.id.clone();
    match render(&config, &handle, &job_id, &segments).await {
        Ok((output_path, output_file)) => {
            {
                let mut job = handle.job.write().await;
                job.output_path = Some(output_path);
                job.transition(JobState::Complete);
            }
            info!(job_id = %job_id, output = %output_file, "Render complete");
            handle.emit(ProgressEvent::complete(job_id, output_file));
            handle.cleanup_workdir().await;
        }
        Err(EngineError::Cancelled) => finish_cancelled(&handle, &job_id).await,
        Err(e) => finish_error(&handle, &job_id, e).await,
    }
}

async fn analyze(
    config: &EngineConfig,
    handle: &Arc<JobHandle>,
    job_id: &JobId,
    inputs: Vec<SourceInput>,
) -> EngineResult<()> {
    if handle.cancel_requested() {
        return Err(EngineError::Cancelled);
    }

    // Probe every input up front so a bad file fails fast, naming the
    // offender, before any expensive work starts.
    let total_inputs = inputs.len();
    let mut durations = Vec::with_capacity(total_inputs);
    for (i, input) in inputs.iter().enumerate() {
        if handle.cancel_requested() {
            return Err(EngineError::Cancelled);
        }
        let info = probe_media(&input.path)
            .await
            .map_err(|e| EngineError::UnreadableMedia(format!("{}: {}", input.filename, e)))?;
        debug!(
            job_id = %job_id,
            file = %input.filename,
            duration = info.duration,
            "Probed input"
        );
        durations.push(info.duration);
        handle.emit(ProgressEvent::new(
            job_id.clone(),
            ProgressStep::Uploading,
            (i + 1) as f64 / total_inputs as f64 * 10.0,
        ));
    }

    let mut sources = Vec::with_capacity(total_inputs);
    let mut offset = 0.0;
    for (input, duration) in inputs.iter().zip(&durations) {
        let end = round_ms(offset + duration);
        sources.push(Source::new(&input.filename, round_ms(offset), end));
        offset = end;
    }

    // Single-source jobs work on the original file; multi-source jobs are
    // concatenated into the scratch directory first.
    let media_path = if total_inputs == 1 {
        inputs[0].path.clone()
    } else {
        let merged = handle.workdir.join("merged.mp4");
        let paths: Vec<PathBuf> = inputs.iter().map(|s| s.path.clone()).collect();
        merge_media(&paths, &merged, handle.cancel_rx())
            .await
            .map_err(|e| map_media("ingest", e))?;
        merged
    };

    // The merged container's own duration is authoritative; per-source
    // sums can drift by a frame.
    let duration = if total_inputs == 1 {
        durations[0]
    } else {
        probe_media(&media_path)
            .await
            .map_err(|e| map_media("ingest", e))?
            .duration
    };

    *handle.media_path.write().await = Some(media_path.clone());
    {
        let mut job = handle.job.write().await;
        job.sources = sources;
        job.duration = duration;
        job.transition(JobState::Analyzing);
    }

    let audio_path = handle.workdir.join("analysis.f32le");
    let total_ms = (duration * 1000.0).round() as i64;
    {
        let handle = Arc::clone(handle);
        let job_id = job_id.clone();
        extract_analysis_audio(&media_path, &audio_path, handle.cancel_rx(), move |p| {
            let mut event = ProgressEvent::new(
                job_id.clone(),
                ProgressStep::AudioExtraction,
                10.0 + p.fraction(total_ms) * 10.0,
            );
            if let Some(eta) = p.eta_seconds(total_ms) {
                event = event.with_eta(eta);
            }
            handle.emit(event);
        })
        .await
        .map_err(|e| map_media("audio_extraction", e))?;
    }

    let samples = load_audio_samples(&audio_path)
        .await
        .map_err(|e| map_media("audio_extraction", e))?;
    *handle.waveform.write().await = Some(compute_waveform(&samples, config.waveform_buckets));

    let mut vad =
        SileroVad::new(VAD_SAMPLE_RATE).map_err(|e| map_media("vad_analysis", e))?;
    let frame_size = vad.frame_size();
    let frame_ms = vad.frame_duration_ms();
    let total_frames = samples.len() / frame_size;

    let mut probabilities = Vec::with_capacity(total_frames);
    for (i, frame) in samples.chunks_exact(frame_size).enumerate() {
        probabilities.push(vad.analyze_frame(frame));
        if (i + 1) % VAD_BATCH_FRAMES == 0 {
            if handle.cancel_requested() {
                return Err(EngineError::Cancelled);
            }
            if total_frames > 0 {
                handle.emit(ProgressEvent::new(
                    job_id.clone(),
                    ProgressStep::VadAnalysis,
                    20.0 + (i + 1) as f64 / total_frames as f64 * 30.0,
                ));
            }
            // VAD inference is CPU-bound; give the runtime air between batches
            tokio::task::yield_now().await;
        }
    }

    let timeline = segments_from_probabilities(
        &probabilities,
        frame_ms,
        total_ms.max(0) as u64,
        &config.segmenter,
    );
    debug!(
        job_id = %job_id,
        segments = timeline.len(),
        frames = total_frames,
        "Segmentation finished"
    );

    handle.job.write().await.timeline = timeline;
    Ok(())
}

async fn render(
    config: &EngineConfig,
    handle: &Arc<JobHandle>,
    job_id: &JobId,
    segments: &[jumpcut_models::Segment],
) -> EngineResult<(PathBuf, String)> {
    if handle.cancel_requested() {
        return Err(EngineError::Cancelled);
    }

    let media_path = handle
        .media_path
        .read()
        .await
        .clone()
        .ok_or_else(|| EngineError::processing("render", "working media is missing"))?;

    let output_file = format!("{}_final.mp4", job_id);
    let output_path = config.output_dir.join(&output_file);

    {
        let scratch_dir = handle.workdir.clone();
        let cancel_rx = handle.cancel_rx();
        let handle = Arc::clone(handle);
        let job_id = job_id.clone();
        render_timeline(
            &media_path,
            &output_path,
            segments,
            &scratch_dir,
            &config.render,
            cancel_rx,
            move |p| {
                let mut event = ProgressEvent::new(
                    job_id.clone(),
                    ProgressStep::Rendering,
                    50.0 + p.fraction * 49.0,
                );
                if let Some(eta) = p.eta_seconds {
                    event = event.with_eta(eta);
                }
                handle.emit(event);
            },
        )
        .await
        .map_err(|e| map_media("render", e))?;
    }

    Ok((output_path, output_file))
}

/// Mark the job cancelled, unless a competing path already made it terminal.
async fn finish_cancelled(handle: &Arc<JobHandle>, job_id: &JobId) {
    {
        let mut job = handle.job.write().await;
        if job.state.is_terminal() {
            return;
        }
        job.transition(JobState::Cancelled);
    }
    info!(job_id = %job_id, "Job cancelled");
    handle.emit(ProgressEvent::cancelled(job_id.clone()));
    handle.cleanup_workdir().await;
}

/// Record a stage failure and make the job terminal.
async fn finish_error(handle: &Arc<JobHandle>, job_id: &JobId, err: EngineError) {
    let message = err.to_string();
    {
        let mut job = handle.job.write().await;
        if job.state.is_terminal() {
            warn!(job_id = %job_id, error = %message, "Stage failed after terminal state");
            return;
        }
        job.error = Some(message.clone());
        job.transition(JobState::Error);
    }
    error!(job_id = %job_id, error = %message, "Job failed");
    handle.emit(ProgressEvent::error(job_id.clone(), message));
    handle.cleanup_workdir().await;
}

/// Map media-layer failures into the engine taxonomy, preserving
/// cancellation as its own outcome.
fn map_media(stage: &str, err: MediaError) -> EngineError {
    match err {
        MediaError::Cancelled => EngineError::Cancelled,
        MediaError::FileNotFound(path) => {
            EngineError::UnreadableMedia(path.display().to_string())
        }
        MediaError::InvalidMedia(msg) => EngineError::UnreadableMedia(msg),
        other => EngineError::processing(stage, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_media_preserves_cancellation() {
        assert_eq!(
            map_media("render", MediaError::Cancelled),
            EngineError::Cancelled
        );
    }

    #[test]
    fn test_map_media_names_the_stage() {
        let err = map_media("audio_extraction", MediaError::NoAudioData);
        match err {
            EngineError::ProcessingFailure { stage, .. } => {
                assert_eq!(stage, "audio_extraction");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_map_media_unreadable_input() {
        let err = map_media(
            "ingest",
            MediaError::FileNotFound(PathBuf::from("/tmp/missing.mp4")),
        );
        assert!(matches!(err, EngineError::UnreadableMedia(m) if m.contains("missing.mp4")));
    }
}
