//! Collects per-frame detections and turns them into frame ranges.

use fishcut_core::{
    detected_frames_to_ranges, expand_and_merge, Detection, Frame, FramePredictions, FrameRange,
};

/// Append-only record of which frames had detections.
///
/// Batches are recorded in video order, so the frame list stays ascending
/// and free of duplicates.
#[derive(Debug, Clone, Default)]
pub struct DetectionAggregator {
    frames: Vec<u64>,
    predictions: FramePredictions,
    keep_predictions: bool,
}

impl DetectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also keep the detections themselves, keyed by frame, for annotation
    /// or reporting.
    pub fn keeping_predictions(mut self) -> Self {
        self.keep_predictions = true;
        self
    }

    /// Record one batch. `predictions[i]` belongs to `frames[i]`.
    pub fn record_batch(&mut self, frames: &[Frame], predictions: &[Vec<Detection>]) {
        for (frame, detections) in frames.iter().zip(predictions) {
            if detections.is_empty() {
                continue;
            }
            if self.frames.last().is_some_and(|&last| frame.index <= last) {
                continue;
            }
            self.frames.push(frame.index);
            if self.keep_predictions {
                self.predictions.insert(frame.index, detections.clone());
            }
        }
    }

    /// Ascending indices of frames with at least one detection.
    pub fn frames_with_detections(&self) -> &[u64] {
        &self.frames
    }

    pub fn predictions(&self) -> &FramePredictions {
        &self.predictions
    }

    /// Gap-tolerant ranges over the detected frames.
    pub fn ranges(&self, frame_buffer: u64) -> Vec<FrameRange> {
        detected_frames_to_ranges(&self.frames, frame_buffer)
    }

    /// Ranges padded by the before/after buffers and re-merged.
    pub fn expanded_ranges(
        &self,
        frame_buffer: u64,
        fps: f64,
        buffer_before: f64,
        buffer_after: f64,
        total_frames: u64,
    ) -> Vec<FrameRange> {
        expand_and_merge(
            &self.ranges(frame_buffer),
            fps,
            buffer_before,
            buffer_after,
            total_frames,
        )
    }

    pub fn into_parts(self) -> (Vec<u64>, FramePredictions) {
        (self.frames, self.predictions)
    }
}
