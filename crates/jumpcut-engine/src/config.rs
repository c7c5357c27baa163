//! Engine configuration.

use std::path::PathBuf;

use jumpcut_media::{RenderOptions, SegmenterConfig};

/// Configuration for the job engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for assembled uploads
    pub upload_dir: PathBuf,
    /// Directory for per-job working files (extracted audio, sub-clips)
    pub work_dir: PathBuf,
    /// Directory for rendered artifacts
    pub output_dir: PathBuf,
    /// Maximum concurrently running stages across all jobs
    pub max_workers: usize,
    /// Speech segmentation parameters
    pub segmenter: SegmenterConfig,
    /// Encoder settings for the render pipeline
    pub render: RenderOptions,
    /// Waveform summary length
    pub waveform_buckets: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("outputs"),
            max_workers: default_workers(),
            segmenter: SegmenterConfig::default(),
            render: RenderOptions::default(),
            waveform_buckets: jumpcut_media::WAVEFORM_BUCKETS,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            max_workers: std::env::var("MAX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_workers),
            ..defaults
        }
    }

    /// Create all configured directories.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }
}
