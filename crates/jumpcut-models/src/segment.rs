//! Keep/Cut segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a segment is kept in or cut from the rendered output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Keep this span in the output. Segments submitted without an explicit
    /// type are treated as keep.
    #[default]
    Keep,
    /// Remove this span from the output.
    Cut,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Keep => "keep",
            SegmentKind::Cut => "cut",
        }
    }

    /// The opposite kind.
    pub fn flipped(&self) -> Self {
        match self {
            SegmentKind::Keep => SegmentKind::Cut,
            SegmentKind::Cut => SegmentKind::Keep,
        }
    }
}

/// A typed time interval `[start, end)` in a job's timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Start time in seconds (inclusive)
    pub start: f64,
    /// End time in seconds (exclusive)
    pub end: f64,
    /// Keep or cut; missing on the wire means keep
    #[serde(rename = "type", default)]
    pub kind: SegmentKind,
}

impl Segment {
    pub fn new(start: f64, end: f64, kind: SegmentKind) -> Self {
        Self { start, end, kind }
    }

    pub fn keep(start: f64, end: f64) -> Self {
        Self::new(start, end, SegmentKind::Keep)
    }

    pub fn cut(start: f64, end: f64) -> Self {
        Self::new(start, end, SegmentKind::Cut)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Midpoint in seconds.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Round a timestamp to millisecond precision.
///
/// All timeline timestamps go through this so repeated edits cannot
/// accumulate float drift.
pub fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_default_is_keep() {
        let seg: Segment = serde_json::from_str(r#"{"start":0.0,"end":1.0}"#).unwrap();
        assert_eq!(seg.kind, SegmentKind::Keep);
    }

    #[test]
    fn test_kind_wire_name() {
        let seg = Segment::cut(1.0, 2.0);
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"type\":\"cut\""));
    }

    #[test]
    fn test_flipped() {
        assert_eq!(SegmentKind::Keep.flipped(), SegmentKind::Cut);
        assert_eq!(SegmentKind::Cut.flipped(), SegmentKind::Keep);
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(1.0004), 1.0);
        assert_eq!(round_ms(1.0006), 1.001);
        assert_eq!(round_ms(0.032 * 3.0), 0.096);
    }

    #[test]
    fn test_midpoint() {
        assert!((Segment::keep(2.0, 7.0).midpoint() - 4.5).abs() < f64::EPSILON);
    }
}
