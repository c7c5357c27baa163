//! Timeline edit operations.
//!
//! All operations take the current segment list and return a new list that
//! satisfies the coverage invariant: segments sorted by start, contiguous,
//! non-overlapping, first starting at 0 and last ending at the total
//! duration. Nothing mutates in place, so callers can hold the previous
//! list for undo.

use thiserror::Error;

use crate::segment::{round_ms, Segment, SegmentKind};

/// Half a millisecond; timestamps are ms-rounded so anything closer than
/// this is the same instant.
const EPS: f64 = 0.0005;

/// Errors from timeline validation and edit operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("segment index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("time {t} outside [0, {duration}]")]
    TimeOutOfRange { t: f64, duration: f64 },

    #[error("invalid timeline: {0}")]
    Invalid(String),

    #[error("cannot delete the only segment")]
    LastSegment,
}

/// Validate the coverage invariant against a job's duration.
pub fn validate_timeline(segments: &[Segment], duration: f64) -> Result<(), TimelineError> {
    if segments.is_empty() {
        return Err(TimelineError::Invalid("timeline is empty".to_string()));
    }
    if (segments[0].start).abs() > EPS {
        return Err(TimelineError::Invalid(format!(
            "first segment starts at {}, expected 0",
            segments[0].start
        )));
    }
    for (i, seg) in segments.iter().enumerate() {
        if seg.end - seg.start <= EPS {
            return Err(TimelineError::Invalid(format!(
                "segment {} is empty or inverted ({} >= {})",
                i, seg.start, seg.end
            )));
        }
        if i + 1 < segments.len() {
            let next = &segments[i + 1];
            if (seg.end - next.start).abs() > EPS {
                return Err(TimelineError::Invalid(format!(
                    "gap or overlap between segment {} (ends {}) and {} (starts {})",
                    i,
                    seg.end,
                    i + 1,
                    next.start
                )));
            }
        }
    }
    let last = segments.last().expect("non-empty");
    if (last.end - duration).abs() > EPS {
        return Err(TimelineError::Invalid(format!(
            "last segment ends at {}, expected duration {}",
            last.end, duration
        )));
    }
    Ok(())
}

/// Flip the kind of the segment at `index`.
pub fn toggle(segments: &[Segment], index: usize) -> Result<Vec<Segment>, TimelineError> {
    let seg = segments
        .get(index)
        .ok_or(TimelineError::IndexOutOfRange {
            index,
            len: segments.len(),
        })?;
    let mut out = segments.to_vec();
    out[index] = Segment::new(seg.start, seg.end, seg.kind.flipped());
    Ok(out)
}

/// Split the segment containing `t` into two segments of the same kind.
///
/// A `t` that already sits on a boundary is a no-op; a `t` outside
/// `[0, duration]` is rejected.
pub fn split(segments: &[Segment], t: f64) -> Result<Vec<Segment>, TimelineError> {
    let duration = segments.last().map(|s| s.end).unwrap_or(0.0);
    let t = round_ms(t);
    if t < -EPS || t > duration + EPS {
        return Err(TimelineError::TimeOutOfRange { t, duration });
    }

    let mut out = Vec::with_capacity(segments.len() + 1);
    for seg in segments {
        if t > seg.start + EPS && t < seg.end - EPS {
            out.push(Segment::new(seg.start, t, seg.kind));
            out.push(Segment::new(t, seg.end, seg.kind));
        } else {
            out.push(*seg);
        }
    }
    Ok(out)
}

/// Set `kind` on every segment whose midpoint falls within `[start, end]`,
/// splitting at the range boundaries first so the range edges are exact.
pub fn set_range_type(
    segments: &[Segment],
    range_start: f64,
    range_end: f64,
    kind: SegmentKind,
) -> Result<Vec<Segment>, TimelineError> {
    if range_end < range_start {
        return Err(TimelineError::TimeOutOfRange {
            t: range_end,
            duration: range_start,
        });
    }
    let out = split(segments, range_start)?;
    let mut out = split(&out, range_end)?;
    let (a, b) = (round_ms(range_start), round_ms(range_end));
    for seg in out.iter_mut() {
        let mid = seg.midpoint();
        if mid >= a - EPS && mid <= b + EPS {
            seg.kind = kind;
        }
    }
    Ok(out)
}

/// Remove the segment at `index`, letting a neighbor absorb its span.
///
/// Policy: the preceding segment absorbs interior deletions; deleting the
/// first segment extends the next one back to 0, and deleting the last
/// extends the previous one to the total duration. The covered span never
/// changes.
pub fn delete(segments: &[Segment], index: usize) -> Result<Vec<Segment>, TimelineError> {
    if index >= segments.len() {
        return Err(TimelineError::IndexOutOfRange {
            index,
            len: segments.len(),
        });
    }
    if segments.len() == 1 {
        return Err(TimelineError::LastSegment);
    }

    let removed = segments[index];
    let mut out = Vec::with_capacity(segments.len() - 1);
    out.extend_from_slice(&segments[..index]);
    out.extend_from_slice(&segments[index + 1..]);

    if index == 0 {
        out[0].start = removed.start;
    } else {
        out[index - 1].end = removed.end;
    }
    Ok(out)
}

/// Merge adjacent segments of the same kind.
///
/// The inverse of `split` for same-kind neighbors; segmentation output and
/// edit results both stay stable under it.
pub fn coalesce(segments: &[Segment]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match out.last_mut() {
            Some(prev) if prev.kind == seg.kind && (prev.end - seg.start).abs() <= EPS => {
                prev.end = seg.end;
            }
            _ => out.push(*seg),
        }
    }
    out
}
