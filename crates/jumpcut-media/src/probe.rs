//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// File size in bytes
    pub size: u64,
    /// Video codec, when a video stream exists
    pub video_codec: Option<String>,
    /// Whether an audio stream exists
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
}

/// Probe a media file for duration and stream layout.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    parse_probe_output(probe, path)
}

fn parse_probe_output(probe: FfprobeOutput, path: &Path) -> MediaResult<MediaInfo> {
    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    if duration <= 0.0 {
        return Err(MediaError::InvalidMedia(format!(
            "{} has no readable duration",
            path.display()
        )));
    }

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let video_codec = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .and_then(|s| s.codec_name.clone());

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    Ok(MediaInfo {
        duration,
        size,
        video_codec,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(json: &str) -> MediaResult<MediaInfo> {
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        parse_probe_output(probe, &PathBuf::from("test.mp4"))
    }

    #[test]
    fn test_parse_full_output() {
        let info = parse(
            r#"{
                "format": {"duration": "12.5", "size": "1048576"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264"},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        )
        .unwrap();
        assert!((info.duration - 12.5).abs() < f64::EPSILON);
        assert_eq!(info.size, 1048576);
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert!(info.has_audio);
    }

    #[test]
    fn test_parse_missing_duration_rejected() {
        let result = parse(r#"{"format": {}, "streams": []}"#);
        assert!(matches!(result, Err(MediaError::InvalidMedia(_))));
    }

    #[test]
    fn test_parse_audio_only() {
        let info = parse(
            r#"{
                "format": {"duration": "3.0"},
                "streams": [{"codec_type": "audio", "codec_name": "mp3"}]
            }"#,
        )
        .unwrap();
        assert!(info.video_codec.is_none());
        assert!(info.has_audio);
    }
}
