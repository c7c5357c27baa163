//! Selective rendering of kept timeline intervals.
//!
//! Each keep segment is extracted as an independent sub-clip, then the
//! sub-clips are concatenated in timeline order. Extraction re-encodes
//! with two-pass seeking so cut boundaries are frame-accurate even when
//! they fall off a keyframe; the concat step is a pure stream copy.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info};

use jumpcut_models::{coalesce, Segment, SegmentKind};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::concat::concat_list;
use crate::error::{MediaError, MediaResult};

/// Encoder settings for sub-clip extraction.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Progress snapshot reported while rendering.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// Fraction of kept duration processed, 0.0-1.0
    pub fraction: f64,
    /// Estimated seconds remaining, once enough clips have completed
    pub eta_seconds: Option<f64>,
    /// Sub-clips finished so far
    pub clips_done: usize,
    /// Total sub-clips to process
    pub clips_total: usize,
}

/// Reduce a timeline snapshot to the list of intervals to extract.
///
/// Filters to keep segments (a missing type already deserialized as keep)
/// and merges adjacent keeps so boundaries that carry no cut between them
/// do not force an extra encode.
pub fn plan_render(segments: &[Segment]) -> Vec<Segment> {
    let keeps: Vec<Segment> = segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Keep)
        .copied()
        .collect();
    coalesce(&keeps)
}

/// Rolling average of per-clip processing speed, for ETA extrapolation.
#[derive(Debug, Default)]
pub(crate) struct RollingEta {
    /// (kept seconds, wall seconds) of recent clips
    window: VecDeque<(f64, f64)>,
}

impl RollingEta {
    const WINDOW: usize = 5;

    pub(crate) fn record(&mut self, clip_secs: f64, elapsed_secs: f64) {
        if self.window.len() == Self::WINDOW {
            self.window.pop_front();
        }
        self.window.push_back((clip_secs, elapsed_secs));
    }

    /// Seconds expected for `remaining_secs` of kept media.
    pub(crate) fn eta(&self, remaining_secs: f64) -> Option<f64> {
        let (media, wall): (f64, f64) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(m, w), (cm, cw)| (m + cm, w + cw));
        if media <= 0.0 || wall <= 0.0 {
            return None;
        }
        Some(remaining_secs * (wall / media))
    }
}

/// Render the kept intervals of `segments` from `input` into `output`.
///
/// Intermediate sub-clips live in a temp directory under `scratch_dir` and
/// are removed on every exit path, including cancellation. Cancellation is
/// observed before each sub-clip and inside every ffmpeg run.
pub async fn render_timeline<F>(
    input: &Path,
    output: &Path,
    segments: &[Segment],
    scratch_dir: &Path,
    options: &RenderOptions,
    cancel_rx: watch::Receiver<bool>,
    progress_callback: F,
) -> MediaResult<()>
where
    F: Fn(RenderProgress) + Send + Sync + 'static,
{
    let clips = plan_render(segments);
    if clips.is_empty() {
        return Err(MediaError::NothingToRender);
    }

    let total_keep_secs: f64 = clips.iter().map(|c| c.duration()).sum();
    info!(
        input = %input.display(),
        clips = clips.len(),
        keep_secs = format!("{:.1}", total_keep_secs),
        "Starting render"
    );

    let temp_dir = tempfile::tempdir_in(scratch_dir)?;
    let progress_callback = Arc::new(progress_callback);
    let mut eta = RollingEta::default();
    let mut done_secs = 0.0f64;
    let mut clip_paths = Vec::with_capacity(clips.len());

    for (i, clip) in clips.iter().enumerate() {
        if *cancel_rx.borrow() {
            return Err(MediaError::Cancelled);
        }

        let clip_path = temp_dir.path().join(format!("clip_{:04}.mp4", i));
        let started = Instant::now();

        extract_sub_clip(input, &clip_path, clip, options, cancel_rx.clone(), {
            let callback = Arc::clone(&progress_callback);
            let clip_secs = clip.duration();
            let eta_hint = eta.eta(total_keep_secs - done_secs);
            let clips_total = clips.len();
            move |in_clip_secs: f64| {
                let fraction =
                    ((done_secs + in_clip_secs.min(clip_secs)) / total_keep_secs).clamp(0.0, 1.0);
                callback(RenderProgress {
                    fraction,
                    eta_seconds: eta_hint,
                    clips_done: i,
                    clips_total,
                });
            }
        })
        .await
        .map_err(|e| match e {
            MediaError::Cancelled => MediaError::Cancelled,
            other => MediaError::ffmpeg_failed(
                format!("sub-clip {} extraction failed: {}", i, other),
                None,
                None,
            ),
        })?;

        eta.record(clip.duration(), started.elapsed().as_secs_f64());
        done_secs += clip.duration();
        clip_paths.push(clip_path);

        progress_callback(RenderProgress {
            fraction: (done_secs / total_keep_secs).clamp(0.0, 1.0),
            eta_seconds: eta.eta(total_keep_secs - done_secs),
            clips_done: i + 1,
            clips_total: clips.len(),
        });
    }

    if *cancel_rx.borrow() {
        return Err(MediaError::Cancelled);
    }

    concat_sub_clips(&clip_paths, output, temp_dir.path(), cancel_rx)
        .await
        .map_err(|e| match e {
            MediaError::Cancelled => MediaError::Cancelled,
            other => MediaError::ffmpeg_failed(
                format!("sub-clip concatenation failed: {}", other),
                None,
                None,
            ),
        })?;

    info!(output = %output.display(), clips = clip_paths.len(), "Render complete");
    Ok(())
}

/// Extract one keep interval with frame-accurate boundaries.
///
/// Two-pass seeking: a fast input seek lands on a keyframe shortly before
/// the target, then an accurate output seek decodes to the exact frame.
async fn extract_sub_clip<F>(
    input: &Path,
    output: &Path,
    clip: &Segment,
    options: &RenderOptions,
    cancel_rx: watch::Receiver<bool>,
    progress_callback: F,
) -> MediaResult<()>
where
    F: Fn(f64) + Send + 'static,
{
    let fast_seek = (clip.start - 5.0).max(0.0);
    let accurate_seek = clip.start - fast_seek;

    debug!(
        start = clip.start,
        duration = clip.duration(),
        "Extracting sub-clip"
    );

    let cmd = FfmpegCommand::new(input, output)
        .seek(fast_seek)
        .output_seek(accurate_seek)
        .duration(clip.duration())
        .video_codec(&options.video_codec)
        .preset(&options.preset)
        .crf(options.crf)
        .audio_codec(&options.audio_codec)
        .audio_bitrate(&options.audio_bitrate)
        .output_args(["-avoid_negative_ts", "make_zero"]);

    FfmpegRunner::new()
        .with_cancel(cancel_rx)
        .run_with_progress(&cmd, move |p| {
            progress_callback(p.out_time_ms as f64 / 1000.0);
        })
        .await
}

/// Concatenate sub-clips with stream copy.
async fn concat_sub_clips(
    clips: &[std::path::PathBuf],
    output: &Path,
    temp_dir: &Path,
    cancel_rx: watch::Receiver<bool>,
) -> MediaResult<()> {
    let list_path = temp_dir.join("concat.txt");
    tokio::fs::write(&list_path, concat_list(clips)).await?;

    let cmd = FfmpegCommand::new(&list_path, output)
        .concat_input()
        .codec_copy()
        .output_args(["-movflags", "+faststart"]);

    FfmpegRunner::new().with_cancel(cancel_rx).run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> Vec<Segment> {
        vec![
            Segment::cut(0.0, 1.0),
            Segment::keep(1.0, 4.0),
            Segment::cut(4.0, 6.0),
            Segment::keep(6.0, 9.0),
            Segment::cut(9.0, 10.0),
        ]
    }

    #[test]
    fn test_plan_filters_cuts() {
        let plan = plan_render(&timeline());
        assert_eq!(plan, vec![Segment::keep(1.0, 4.0), Segment::keep(6.0, 9.0)]);
        // Rendered duration is the keep total, independent of cut spans
        let total: f64 = plan.iter().map(|c| c.duration()).sum();
        assert!((total - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_merges_adjacent_keeps() {
        let segments = vec![
            Segment::keep(0.0, 2.0),
            Segment::keep(2.0, 5.0),
            Segment::cut(5.0, 10.0),
        ];
        let plan = plan_render(&segments);
        assert_eq!(plan, vec![Segment::keep(0.0, 5.0)]);
    }

    #[test]
    fn test_plan_all_cut_is_empty() {
        let segments = vec![Segment::cut(0.0, 10.0)];
        assert!(plan_render(&segments).is_empty());
    }

    #[test]
    fn test_rolling_eta() {
        let mut eta = RollingEta::default();
        assert!(eta.eta(10.0).is_none());

        // 2 media seconds processed per wall second
        eta.record(4.0, 2.0);
        eta.record(6.0, 3.0);
        let estimate = eta.eta(10.0).unwrap();
        assert!((estimate - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_render_cancelled_before_first_clip() {
        let scratch = tempfile::tempdir().unwrap();
        let output = scratch.path().join("out.mp4");
        let (_cancel_tx, cancel_rx) = watch::channel(true);

        let result = render_timeline(
            Path::new("input.mp4"),
            &output,
            &timeline(),
            scratch.path(),
            &RenderOptions::default(),
            cancel_rx,
            |_| {},
        )
        .await;

        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(!output.exists());

        // The sub-clip temp directory is reclaimed on the cancel path
        let mut entries = tokio::fs::read_dir(scratch.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[test]
    fn test_rolling_eta_window_slides() {
        let mut eta = RollingEta::default();
        // Old slow clips fall out of the window
        for _ in 0..5 {
            eta.record(1.0, 10.0);
        }
        for _ in 0..5 {
            eta.record(1.0, 1.0);
        }
        let estimate = eta.eta(10.0).unwrap();
        assert!((estimate - 10.0).abs() < 1e-9);
    }
}
