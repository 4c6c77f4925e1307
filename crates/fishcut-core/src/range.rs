//! Conversion of per-frame detections into cut ranges.
//!
//! Detections are noisy: a fish can be missed for a handful of frames while
//! it is plainly on screen. Ranges therefore tolerate short gaps, and are
//! later padded with a time buffer on both sides before cutting.

use crate::time::frame_to_timecode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive interval of frame indices, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
}

impl FrameRange {
    /// Create a range. The bounds are swapped if given in reverse.
    pub fn new(start: u64, end: u64) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// A range covering exactly one frame.
    pub fn single(frame: u64) -> Self {
        Self {
            start: frame,
            end: frame,
        }
    }

    /// Number of frames covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Ranges are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, frame: u64) -> bool {
        self.start <= frame && frame <= self.end
    }

    /// Start and end in seconds at the given frame rate.
    pub fn to_seconds(&self, fps: f64) -> (f64, f64) {
        if fps <= 0.0 {
            return (0.0, 0.0);
        }
        (self.start as f64 / fps, self.end as f64 / fps)
    }

    /// Start and end as `HH:MM:SS.mmm` timecodes.
    pub fn to_timecodes(&self, fps: f64) -> (String, String) {
        (
            frame_to_timecode(self.start, fps),
            frame_to_timecode(self.end, fps),
        )
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}

/// Convert ascending detected frame indices into gap-tolerant ranges.
///
/// A frame extends the current range when it lies at most `frame_buffer`
/// frames after the current end; otherwise it starts a new range.
/// `frames` must be ascending; an empty slice yields no ranges.
pub fn detected_frames_to_ranges(frames: &[u64], frame_buffer: u64) -> Vec<FrameRange> {
    let Some((&first, rest)) = frames.split_first() else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    let mut current = FrameRange::single(first);

    for &frame in rest {
        debug_assert!(frame >= current.end, "detected frames must be ascending");
        if frame <= current.end.saturating_add(frame_buffer) {
            current.end = current.end.max(frame);
        } else {
            ranges.push(current);
            current = FrameRange::single(frame);
        }
    }
    ranges.push(current);

    ranges
}

/// Number of frames covered by `seconds` at `fps`, truncated.
pub fn seconds_to_frames(fps: f64, seconds: f64) -> u64 {
    if fps <= 0.0 || seconds <= 0.0 {
        return 0;
    }
    (fps * seconds) as u64
}

/// Pad every range with a time buffer and merge the ranges that now overlap.
///
/// Starts move back by `fps * buffer_before` frames (clamped to 0) and ends
/// move forward by `fps * buffer_after` frames (clamped to the last frame of
/// a `total_frames` long video). A clamped end never falls below the
/// range's own end, so detected frames stay covered even when the video
/// turns out longer than `total_frames`. The result is merged with
/// [`merge_overlapping`].
pub fn expand_and_merge(
    ranges: &[FrameRange],
    fps: f64,
    buffer_before: f64,
    buffer_after: f64,
    total_frames: u64,
) -> Vec<FrameRange> {
    let before = seconds_to_frames(fps, buffer_before);
    let after = seconds_to_frames(fps, buffer_after);
    let last_frame = total_frames.saturating_sub(1);

    let expanded = ranges.iter().map(|range| {
        let start = range.start.saturating_sub(before);
        let end = range.end.saturating_add(after).min(last_frame).max(range.end);
        FrameRange { start, end }
    });

    merge_overlapping(expanded)
}

/// Sort ranges by start and merge those sharing at least one frame.
///
/// A range is folded into the previous one when it starts at or before the
/// previous end. Adjacent ranges such as `(0, 10)` and `(11, 20)` stay
/// separate.
pub fn merge_overlapping(ranges: impl IntoIterator<Item = FrameRange>) -> Vec<FrameRange> {
    let mut sorted: Vec<FrameRange> = ranges.into_iter().collect();
    sorted.sort_by_key(|r| r.start);

    let mut merged: Vec<FrameRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(prev) if range.start <= prev.end => {
                prev.end = prev.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Every frame index covered by `ranges`, ascending.
pub fn covered_frames(ranges: &[FrameRange]) -> Vec<u64> {
    ranges.iter().flat_map(|r| r.start..=r.end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> FrameRange {
        FrameRange::new(start, end)
    }

    #[test]
    fn test_empty_input() {
        assert!(detected_frames_to_ranges(&[], 5).is_empty());
        assert!(detected_frames_to_ranges(&[], 0).is_empty());
    }

    #[test]
    fn test_single_frame() {
        assert_eq!(detected_frames_to_ranges(&[7], 0), vec![r(7, 7)]);
    }

    #[test]
    fn test_gap_tolerance_boundary() {
        assert_eq!(detected_frames_to_ranges(&[10, 15], 5), vec![r(10, 15)]);
        assert_eq!(
            detected_frames_to_ranges(&[10, 15], 4),
            vec![r(10, 10), r(15, 15)]
        );
    }

    #[test]
    fn test_consecutive_frames_with_zero_buffer() {
        assert_eq!(
            detected_frames_to_ranges(&[1, 2, 3, 5, 6], 0),
            vec![r(1, 1), r(2, 2), r(3, 3), r(5, 5), r(6, 6)]
        );
        assert_eq!(
            detected_frames_to_ranges(&[1, 2, 3, 5, 6], 1),
            vec![r(1, 3), r(5, 6)]
        );
    }

    #[test]
    fn test_several_runs() {
        let frames = [0, 1, 2, 40, 41, 70, 100, 131];
        assert_eq!(
            detected_frames_to_ranges(&frames, 31),
            vec![r(0, 2), r(40, 131)]
        );
        assert_eq!(
            detected_frames_to_ranges(&frames, 29),
            vec![r(0, 2), r(40, 70), r(100, 100), r(131, 131)]
        );
    }

    #[test]
    fn test_expand_keeps_separated_ranges_apart() {
        // (70, 140) and (170, 240) are 30 frames apart after padding.
        let ranges = [r(100, 110), r(200, 210)];
        assert_eq!(
            expand_and_merge(&ranges, 30.0, 1.0, 1.0, 10_000),
            vec![r(70, 140), r(170, 240)]
        );
    }

    #[test]
    fn test_expand_and_merge_overlapping() {
        let ranges = [r(100, 110), r(150, 160)];
        assert_eq!(
            expand_and_merge(&ranges, 30.0, 1.0, 1.0, 10_000),
            vec![r(70, 190)]
        );
    }

    #[test]
    fn test_expand_never_drops_frames_past_reported_length() {
        // The container claimed 100 frames but frame 110 was decoded.
        let ranges = [r(110, 110)];
        assert_eq!(
            expand_and_merge(&ranges, 30.0, 1.0, 1.0, 100),
            vec![r(80, 110)]
        );
    }

    #[test]
    fn test_expand_without_overlap() {
        let ranges = [r(100, 110), r(300, 310)];
        assert_eq!(
            expand_and_merge(&ranges, 30.0, 1.0, 1.0, 10_000),
            vec![r(70, 140), r(270, 340)]
        );
    }

    #[test]
    fn test_expand_clamps_to_video() {
        let ranges = [r(10, 20), r(490, 495)];
        assert_eq!(
            expand_and_merge(&ranges, 25.0, 2.0, 2.0, 500),
            vec![r(0, 70), r(440, 499)]
        );
    }

    #[test]
    fn test_expand_zero_buffers_is_identity() {
        let ranges = [r(1, 2), r(5, 9)];
        assert_eq!(expand_and_merge(&ranges, 30.0, 0.0, 0.0, 100), ranges);
    }

    #[test]
    fn test_fractional_fps_truncates() {
        // 29.97 * 1s = 29.97 -> 29 frames
        assert_eq!(seconds_to_frames(29.97, 1.0), 29);
        assert_eq!(seconds_to_frames(0.0, 1.0), 0);
        assert_eq!(seconds_to_frames(30.0, -1.0), 0);
    }

    #[test]
    fn test_merge_overlapping_sorts_first() {
        let merged = merge_overlapping([r(50, 60), r(0, 10), r(10, 20), r(55, 80)]);
        assert_eq!(merged, vec![r(0, 20), r(50, 80)]);
    }

    #[test]
    fn test_merge_keeps_adjacent_ranges() {
        let merged = merge_overlapping([r(11, 20), r(0, 10), r(20, 25)]);
        assert_eq!(merged, vec![r(0, 10), r(11, 25)]);
    }

    #[test]
    fn test_range_helpers() {
        let range = r(30, 59);
        assert_eq!(range.len(), 30);
        assert!(range.contains(30) && range.contains(59) && !range.contains(60));
        assert_eq!(range.to_seconds(30.0), (1.0, 59.0 / 30.0));
        assert_eq!(FrameRange::new(9, 3), r(3, 9));
        assert_eq!(range.to_string(), "(30, 59)");
    }
}
