//! Keep/Cut segmentation from per-frame speech probabilities.
//!
//! The segmenter thresholds VAD probabilities into speech runs, applies
//! hysteresis (minimum speech duration, speech padding, minimum silence
//! before a cut), and synthesizes a timeline that covers the full duration
//! with no gaps or overlaps: cut segments fill everything between keeps.
//!
//! Timestamps are computed from frame index multiplied by the frame
//! duration and carried in integer milliseconds until the final
//! conversion, so repeated edits never accumulate float drift.

use jumpcut_models::{Segment, SegmentKind};
use serde::{Deserialize, Serialize};

/// Configuration for the speech segmenter.
///
/// Defaults follow Silero's recommended parameters for conversational
/// video: a threshold of 0.35 keeps quiet speakers, 200ms of silence is
/// required before a region may become a cut, and 80ms of padding guards
/// word onsets and tails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Speech probability threshold (0.0-1.0)
    pub vad_threshold: f32,
    /// Minimum contiguous silence before a region may flip to cut (ms)
    pub min_silence_ms: u64,
    /// Minimum speech run length; shorter blips are treated as noise (ms)
    pub min_speech_ms: u64,
    /// Padding added to the start and end of each keep region (ms)
    pub speech_pad_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.35,
            min_silence_ms: 200,
            min_speech_ms: 150,
            speech_pad_ms: 80,
        }
    }
}

/// A half-open interval in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunMs {
    start: u64,
    end: u64,
}

/// Build a covering keep/cut timeline from per-frame speech probabilities.
///
/// `total_duration_ms` may exceed the span of the frames (the PCM tail
/// shorter than one frame); uncovered trailing time becomes a cut.
pub fn segments_from_probabilities(
    probabilities: &[f32],
    frame_duration_ms: u64,
    total_duration_ms: u64,
    config: &SegmenterConfig,
) -> Vec<Segment> {
    let speech_runs = speech_runs_ms(probabilities, frame_duration_ms, config);
    let padded = pad_and_merge(speech_runs, total_duration_ms, config);
    fill_timeline(&padded, total_duration_ms)
}

/// Threshold frames and collect contiguous speech runs, dropping runs
/// shorter than the minimum speech duration.
fn speech_runs_ms(
    probabilities: &[f32],
    frame_duration_ms: u64,
    config: &SegmenterConfig,
) -> Vec<RunMs> {
    let mut runs = Vec::new();
    let mut current: Option<RunMs> = None;

    for (i, &prob) in probabilities.iter().enumerate() {
        let start = i as u64 * frame_duration_ms;
        let end = start + frame_duration_ms;

        if prob >= config.vad_threshold {
            match current.as_mut() {
                Some(run) => run.end = end,
                None => current = Some(RunMs { start, end }),
            }
        } else if let Some(run) = current.take() {
            runs.push(run);
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }

    runs.retain(|run| run.end - run.start >= config.min_speech_ms);
    runs
}

/// Pad each speech run, clamp to the media bounds, and absorb
/// sub-threshold silence gaps into the neighboring keep.
fn pad_and_merge(runs: Vec<RunMs>, total_duration_ms: u64, config: &SegmenterConfig) -> Vec<RunMs> {
    let mut merged: Vec<RunMs> = Vec::with_capacity(runs.len());

    for run in runs {
        let padded = RunMs {
            start: run.start.saturating_sub(config.speech_pad_ms),
            end: (run.end + config.speech_pad_ms).min(total_duration_ms),
        };

        match merged.last_mut() {
            // A gap shorter than the silence threshold is not a real pause;
            // the silence is absorbed into the keep region
            Some(prev) if padded.start.saturating_sub(prev.end) < config.min_silence_ms => {
                prev.end = prev.end.max(padded.end);
            }
            _ => merged.push(padded),
        }
    }

    merged
}

/// Fill the space around keep runs with cut segments so the result covers
/// `[0, total)` exactly.
fn fill_timeline(keeps: &[RunMs], total_duration_ms: u64) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(keeps.len() * 2 + 1);
    let mut cursor = 0u64;

    for keep in keeps {
        if keep.start > cursor {
            segments.push(segment_ms(cursor, keep.start, SegmentKind::Cut));
        }
        segments.push(segment_ms(keep.start, keep.end, SegmentKind::Keep));
        cursor = keep.end;
    }

    if cursor < total_duration_ms {
        segments.push(segment_ms(cursor, total_duration_ms, SegmentKind::Cut));
    }

    segments
}

fn segment_ms(start_ms: u64, end_ms: u64, kind: SegmentKind) -> Segment {
    Segment::new(start_ms as f64 / 1000.0, end_ms as f64 / 1000.0, kind)
}
