//! Engine error taxonomy.
//!
//! Validation errors are synchronous rejections of the triggering call and
//! never mutate job state. Stage failures are recorded on the job,
//! surfaced as an `error` progress event, and make the job terminal.
//! Cancellation is a terminal outcome, not a failure, and is never stored
//! in a job's `error` field.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from registry, upload and pipeline operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("incomplete upload: received {received} of {declared} bytes")]
    IncompleteUpload { received: u64, declared: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid timeline: {0}")]
    InvalidTimeline(String),

    #[error("processing failure in {stage}: {message}")]
    ProcessingFailure { stage: String, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn processing(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessingFailure {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_stage() {
        let err = EngineError::processing("render", "ffmpeg exited");
        assert_eq!(err.to_string(), "processing failure in render: ffmpeg exited");
    }

    #[test]
    fn test_incomplete_upload_counts() {
        let err = EngineError::IncompleteUpload {
            received: 512,
            declared: 1024,
        };
        assert!(err.to_string().contains("512"));
        assert!(err.to_string().contains("1024"));
    }
}
