//! Job definitions and lifecycle states.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{Segment, Source};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// `TimelineReady` is re-entrant: timeline edits do not change state; only a
/// render request moves the job to `Rendering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Sources are being ingested (upload assembly, probe, merge)
    #[default]
    Uploading,
    /// Audio extraction and voice-activity analysis are running
    Analyzing,
    /// Analysis finished; the timeline may be edited and a render requested
    TimelineReady,
    /// The render pipeline is producing the output artifact
    Rendering,
    /// Artifact written; terminal
    Complete,
    /// A stage failed; terminal
    Error,
    /// Cancelled by the caller; terminal
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Uploading => "uploading",
            JobState::Analyzing => "analyzing",
            JobState::TimelineReady => "timeline_ready",
            JobState::Rendering => "rendering",
            JobState::Complete => "complete",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Error | JobState::Cancelled
        )
    }

    /// Whether the analysis phase has completed for this state.
    pub fn timeline_available(&self) -> bool {
        matches!(
            self,
            JobState::TimelineReady | JobState::Rendering | JobState::Complete
        )
    }
}

/// Snapshot of a job's state.
///
/// The engine owns the live job; callers only ever see clones of this
/// struct, so a status query can never race an active stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Input spans within the merged timeline, ordered by start
    #[serde(default)]
    pub sources: Vec<Source>,

    /// Total duration of the (possibly merged) media in seconds
    #[serde(default)]
    pub duration: f64,

    /// Keep/Cut timeline; empty until analysis completes
    #[serde(default)]
    pub timeline: Vec<Segment>,

    /// Whether cancellation has been requested
    #[serde(default)]
    pub cancel_requested: bool,

    /// Error message (only set in the Error state)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Path to the rendered artifact (only set once Complete)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job in the Uploading state.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            state: JobState::Uploading,
            sources: Vec::new(),
            duration: 0.0,
            timeline: Vec::new(),
            cancel_requested: false,
            error: None,
            output_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a state transition, refreshing the update timestamp.
    pub fn transition(&mut self, state: JobState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Complete.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Uploading.is_terminal());
        assert!(!JobState::TimelineReady.is_terminal());
    }

    #[test]
    fn test_timeline_available() {
        assert!(!JobState::Analyzing.timeline_available());
        assert!(JobState::TimelineReady.timeline_available());
        assert!(JobState::Rendering.timeline_available());
    }

    #[test]
    fn test_state_serde_snake_case() {
        let json = serde_json::to_string(&JobState::TimelineReady).unwrap();
        assert_eq!(json, "\"timeline_ready\"");
    }

    #[test]
    fn test_transition_updates_timestamp() {
        let mut job = Job::new();
        let before = job.updated_at;
        job.transition(JobState::Analyzing);
        assert_eq!(job.state, JobState::Analyzing);
        assert!(job.updated_at >= before);
    }
}
