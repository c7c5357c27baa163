//! FFmpeg CLI wrapper for the Jumpcut pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation support via tokio watch channels (the child process is
//!   killed, never leaked)
//! - Audio extraction to the VAD analysis format
//! - Silero VAD scoring and keep/cut segmentation
//! - Waveform summaries for the editor UI
//! - Multi-source concatenation and selective rendering

pub mod audio;
pub mod command;
pub mod concat;
pub mod error;
pub mod probe;
pub mod progress;
pub mod render;
pub mod segmenter;
pub mod vad;
pub mod waveform;

pub use audio::{extract_analysis_audio, load_audio_samples, VAD_SAMPLE_RATE};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::merge_media;
pub use error::{MediaError, MediaResult};
pub use probe::{probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use render::{plan_render, render_timeline, RenderOptions, RenderProgress};
pub use segmenter::{segments_from_probabilities, SegmenterConfig};
pub use vad::SileroVad;
pub use waveform::{compute_waveform, WAVEFORM_BUCKETS};
