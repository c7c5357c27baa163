//! Wrapper for Silero VAD v5 using the voice_activity_detector crate.
//!
//! Silero VAD v5 supports fixed frame sizes:
//! - 8kHz: 256 samples per frame (~32ms)
//! - 16kHz: 512 samples per frame (~32ms)
//!
//! The model runs on CPU, handles music and background noise well, and
//! ships its ONNX weights inside the crate, so no external downloads are
//! needed.

use tracing::{debug, trace};
use voice_activity_detector::VoiceActivityDetector;

use crate::error::{MediaError, MediaResult};

/// Wrapper around Silero VAD for per-frame speech scoring.
pub struct SileroVad {
    vad: VoiceActivityDetector,
    sample_rate: usize,
    frame_size: usize,
}

impl SileroVad {
    /// Create a new instance for the given sample rate (8000 or 16000).
    pub fn new(sample_rate: usize) -> MediaResult<Self> {
        let frame_size = match sample_rate {
            8000 => 256,
            16000 => 512,
            _ => {
                return Err(MediaError::Vad(format!(
                    "sample rate must be 8000 or 16000, got {}",
                    sample_rate
                )));
            }
        };

        let vad = VoiceActivityDetector::builder()
            .sample_rate(sample_rate as i64)
            .chunk_size(frame_size)
            .build()
            .map_err(|e| MediaError::Vad(format!("failed to create VAD: {:?}", e)))?;

        debug!(
            sample_rate = sample_rate,
            frame_size = frame_size,
            "Initialized Silero VAD v5"
        );

        Ok(Self {
            vad,
            sample_rate,
            frame_size,
        })
    }

    /// Expected samples per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Frame duration in milliseconds.
    pub fn frame_duration_ms(&self) -> u64 {
        (self.frame_size * 1000 / self.sample_rate) as u64
    }

    /// Score a single frame, returning a speech probability in [0, 1].
    ///
    /// Samples must be f32 in [-1.0, 1.0]; short frames are padded by the
    /// underlying model.
    pub fn analyze_frame(&mut self, samples: &[f32]) -> f32 {
        if samples.len() != self.frame_size {
            trace!(
                expected = self.frame_size,
                got = samples.len(),
                "Frame size mismatch (will be padded/truncated)"
            );
        }

        let prob = self.vad.predict(samples.iter().copied());
        trace!(speech_prob = prob, "VAD frame analyzed");
        prob
    }

    /// Sample rate this instance is configured for.
    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vad_creation() {
        assert!(SileroVad::new(16000).is_ok());
        assert!(SileroVad::new(8000).is_ok());
    }

    #[test]
    fn test_invalid_sample_rate() {
        assert!(SileroVad::new(44100).is_err());
    }

    #[test]
    fn test_frame_geometry() {
        let vad = SileroVad::new(16000).unwrap();
        assert_eq!(vad.frame_size(), 512);
        assert_eq!(vad.frame_duration_ms(), 32);

        let vad = SileroVad::new(8000).unwrap();
        assert_eq!(vad.frame_size(), 256);
        assert_eq!(vad.frame_duration_ms(), 32);
    }

    #[test]
    fn test_analyze_silence() {
        let mut vad = SileroVad::new(16000).unwrap();
        let silence = vec![0.0f32; vad.frame_size()];
        let prob = vad.analyze_frame(&silence);
        assert!(prob < 0.5, "silence should have low speech probability");
    }
}
