//! Audio extraction for voice-activity analysis.

use std::path::Path;

use tokio::sync::watch;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Sample rate for VAD processing (Silero VAD v5 works best at 16kHz).
pub const VAD_SAMPLE_RATE: usize = 16000;

/// Extract the audio track as mono 16kHz raw f32le PCM.
///
/// The progress callback receives ffmpeg's `-progress` records so the
/// caller can turn `out_time_ms` into a percentage of the known duration.
pub async fn extract_analysis_audio<F>(
    input: &Path,
    output: &Path,
    cancel_rx: watch::Receiver<bool>,
    progress_callback: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    debug!(
        input = %input.display(),
        output = %output.display(),
        "Extracting analysis audio"
    );

    let cmd = FfmpegCommand::new(input, output)
        .no_video()
        .audio_channels(1)
        .audio_sample_rate(VAD_SAMPLE_RATE as u32)
        .format("f32le");

    FfmpegRunner::new()
        .with_cancel(cancel_rx)
        .run_with_progress(&cmd, progress_callback)
        .await?;

    let metadata = tokio::fs::metadata(output).await?;
    if metadata.len() == 0 {
        return Err(MediaError::NoAudioData);
    }

    debug!(output_size = metadata.len(), "Audio extraction complete");
    Ok(())
}

/// Load raw f32le audio samples from a file.
pub async fn load_audio_samples(path: &Path) -> MediaResult<Vec<f32>> {
    let bytes = tokio::fs::read(path).await?;

    // 4 bytes per sample, little-endian
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(samples)
}
