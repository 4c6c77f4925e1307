//! Runs the detector over one batch.

use crate::detector::Detector;
use crate::error::{DetectError, DetectResult};
use crate::preprocess::Batch;
use fishcut_core::{Detection, PipelineConfig};
use std::time::{Duration, Instant};
use tracing::debug;

/// Predictions for one batch plus the wall-clock time the detector took.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// One list per frame, aligned with `Batch::frames`.
    pub predictions: Vec<Vec<Detection>>,
    pub elapsed: Duration,
}

impl BatchOutput {
    /// Inference throughput in frames per second.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.predictions.len() as f64 / secs
    }

    /// Number of frames with at least one detection.
    pub fn frames_with_detections(&self) -> usize {
        self.predictions.iter().filter(|p| !p.is_empty()).count()
    }
}

/// Invokes a [`Detector`] batch by batch and filters its output.
///
/// Detections below `prediction_threshold` are dropped and at most
/// `max_detections` are kept per frame, in model order. Failures are not
/// retried; they come back as [`DetectError::Detection`] naming the batch.
pub struct BatchInferenceRunner<'a> {
    detector: &'a mut dyn Detector,
    threshold: f32,
    max_detections: usize,
}

impl<'a> BatchInferenceRunner<'a> {
    pub fn new(detector: &'a mut dyn Detector, config: &PipelineConfig) -> Self {
        Self {
            detector,
            threshold: config.prediction_threshold,
            max_detections: config.max_detections,
        }
    }

    pub fn class_names(&self) -> &[String] {
        self.detector.class_names()
    }

    pub fn run(&mut self, batch: &Batch) -> DetectResult<BatchOutput> {
        let start = Instant::now();
        let result = self.detector.predict_batch(&batch.frames, &batch.input);
        let elapsed = start.elapsed();

        let raw = result.map_err(|err| detection_error(batch, err.to_string()))?;
        if raw.len() != batch.len() {
            let mismatch = DetectError::BatchSizeMismatch {
                expected: batch.len(),
                actual: raw.len(),
            };
            return Err(detection_error(batch, mismatch.to_string()));
        }

        let predictions: Vec<Vec<Detection>> = raw
            .into_iter()
            .map(|detections| {
                detections
                    .into_iter()
                    .filter(|d| d.confidence >= self.threshold)
                    .take(self.max_detections)
                    .collect()
            })
            .collect();

        let output = BatchOutput {
            predictions,
            elapsed,
        };
        debug!(
            batch = batch.index,
            frames = batch.len(),
            hits = output.frames_with_detections(),
            fps = format_args!("{:.2}", output.fps()),
            "Batch processed"
        );
        Ok(output)
    }
}

fn detection_error(batch: &Batch, message: String) -> DetectError {
    DetectError::Detection {
        batch: batch.index,
        start_frame: batch.first_frame(),
        end_frame: batch.last_frame(),
        message,
    }
}
