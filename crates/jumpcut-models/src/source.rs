//! Source spans within a merged timeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One input file's span `[start, end)` within the merged timeline.
///
/// Sources are ordered by `start` and partition the merged duration with no
/// gaps; a single-file job has exactly one source covering `[0, duration)`.
/// Immutable once ingestion completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    /// Display name of the input file
    pub filename: String,
    /// Start of this source within the merged timeline, in seconds
    pub start: f64,
    /// End of this source within the merged timeline, in seconds
    pub end: f64,
}

impl Source {
    pub fn new(filename: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            filename: filename.into(),
            start,
            end,
        }
    }

    /// Duration of this source in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}
