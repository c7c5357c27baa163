//! Shared data models for the Jumpcut backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle states
//! - Sources (per-input spans within a merged timeline)
//! - Keep/Cut segments and the timeline edit operations
//! - Progress events streamed to clients

pub mod job;
pub mod progress;
pub mod segment;
pub mod source;
pub mod timeline;

// Re-export common types
pub use job::{Job, JobId, JobState};
pub use progress::{format_eta, ProgressEvent, ProgressStep};
pub use segment::{Segment, SegmentKind};
pub use source::Source;
pub use timeline::{
    coalesce, delete, set_range_type, split, toggle, validate_timeline, TimelineError,
};
