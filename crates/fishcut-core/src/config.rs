//! Pipeline configuration.
//!
//! One explicit struct handed to every component; there is no process-wide
//! settings state.

use crate::error::{FishcutError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Largest accepted gap tolerance, in seconds.
pub const MAX_FRAME_BUFFER_SECONDS: u32 = 10;

/// Largest accepted per-frame detection cap.
pub const MAX_DETECTIONS_LIMIT: usize = 300;

/// Settings for one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames per inference batch.
    pub batch_size: usize,
    /// Depth of the decoded-batch queue between decoder and inference.
    pub max_queued_batches: usize,
    /// Gap (in seconds) without detections tolerated inside one range.
    pub frame_buffer_seconds: u32,
    /// Seconds of footage kept before each range.
    pub buffer_before: f64,
    /// Seconds of footage kept after each range.
    pub buffer_after: f64,
    /// Minimum confidence for a detection to count, in `[0, 1]`.
    pub prediction_threshold: f32,
    /// Maximum detections kept per frame.
    pub max_detections: usize,
    /// Model input size `(width, height)`.
    pub input_size: (u32, u32),
    /// How long the consumer waits for a batch before reporting "not ready".
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_queued_batches: 4,
            frame_buffer_seconds: 1,
            buffer_before: 0.0,
            buffer_after: 0.0,
            prediction_threshold: 0.5,
            max_detections: 10,
            input_size: (640, 640),
            poll_interval_ms: 50,
        }
    }
}

impl PipelineConfig {
    /// Check every option against its accepted range.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Result<()> {
            Err(FishcutError::InvalidParameter(msg))
        }

        if self.batch_size == 0 {
            return invalid("batch_size must be greater than 0".into());
        }
        if self.max_queued_batches == 0 {
            return invalid("max_queued_batches must be greater than 0".into());
        }
        if self.frame_buffer_seconds > MAX_FRAME_BUFFER_SECONDS {
            return invalid(format!(
                "frame_buffer_seconds must be at most {MAX_FRAME_BUFFER_SECONDS}, got {}",
                self.frame_buffer_seconds
            ));
        }
        for (name, value) in [
            ("buffer_before", self.buffer_before),
            ("buffer_after", self.buffer_after),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        if !(0.0..=1.0).contains(&self.prediction_threshold) {
            return invalid(format!(
                "prediction_threshold must be within [0, 1], got {}",
                self.prediction_threshold
            ));
        }
        if self.max_detections == 0 || self.max_detections > MAX_DETECTIONS_LIMIT {
            return invalid(format!(
                "max_detections must be within 1..={MAX_DETECTIONS_LIMIT}, got {}",
                self.max_detections
            ));
        }
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return invalid(format!(
                "input_size must be non-zero, got {}x{}",
                self.input_size.0, self.input_size.1
            ));
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FishcutError::NotFound(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), ?config, "Loaded pipeline config");
        Ok(config)
    }

    /// Gap tolerance converted to frames at the given rate.
    pub fn frame_buffer_frames(&self, fps: f64) -> u64 {
        if fps <= 0.0 {
            return 0;
        }
        (fps * self.frame_buffer_seconds as f64).round() as u64
    }

    /// Consumer poll timeout.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
