//! Progress events streamed to clients.
//!
//! Events are transient: produced by the running stage, broadcast to
//! subscribers, never persisted beyond the latest state on the job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Pipeline step a progress event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    Initializing,
    Uploading,
    AudioExtraction,
    VadAnalysis,
    AnalysisComplete,
    Rendering,
    Complete,
    Error,
    Cancelled,
}

impl ProgressStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStep::Initializing => "initializing",
            ProgressStep::Uploading => "uploading",
            ProgressStep::AudioExtraction => "audio_extraction",
            ProgressStep::VadAnalysis => "vad_analysis",
            ProgressStep::AnalysisComplete => "analysis_complete",
            ProgressStep::Rendering => "rendering",
            ProgressStep::Complete => "complete",
            ProgressStep::Error => "error",
            ProgressStep::Cancelled => "cancelled",
        }
    }

    /// Whether this step ends the event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressStep::Complete | ProgressStep::Error | ProgressStep::Cancelled
        )
    }
}

/// A single progress update for a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    /// Job this event belongs to
    pub job_id: JobId,

    /// Current pipeline step
    pub step: ProgressStep,

    /// Percentage 0-100, monotone non-decreasing within a step
    pub progress: f64,

    /// Estimated seconds remaining, when one can be computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,

    /// Human-readable ETA, derived from `eta_seconds`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_display: Option<String>,

    /// Output file name; set only on `complete`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    /// Error message; set only on `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, step: ProgressStep, progress: f64) -> Self {
        Self {
            job_id,
            step,
            progress: progress.clamp(0.0, 100.0),
            eta_seconds: None,
            eta_display: None,
            output_file: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_eta(mut self, eta_seconds: f64) -> Self {
        if eta_seconds >= 0.0 {
            self.eta_display = Some(format_eta(eta_seconds));
            self.eta_seconds = Some((eta_seconds * 10.0).round() / 10.0);
        }
        self
    }

    /// Terminal completion event carrying the artifact name.
    pub fn complete(job_id: JobId, output_file: impl Into<String>) -> Self {
        let mut event = Self::new(job_id, ProgressStep::Complete, 100.0);
        event.output_file = Some(output_file.into());
        event
    }

    /// Terminal error event carrying a message.
    pub fn error(job_id: JobId, message: impl Into<String>) -> Self {
        let mut event = Self::new(job_id, ProgressStep::Error, 0.0);
        event.message = Some(message.into());
        event
    }

    /// Terminal cancellation event.
    pub fn cancelled(job_id: JobId) -> Self {
        Self::new(job_id, ProgressStep::Cancelled, 0.0)
    }
}

/// Format seconds into a short human-readable ETA string.
pub fn format_eta(seconds: f64) -> String {
    if !(0.0..=86400.0).contains(&seconds) {
        return "calculating...".to_string();
    }
    let secs = seconds as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
