//! Error types for the detection pipeline.

use fishcut_core::FishcutError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running detection over a video.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The video could not be opened, decoded or written.
    #[error(transparent)]
    Source(#[from] FishcutError),

    /// The detection capability failed on one batch.
    #[error("Detection failed on batch {batch} (frames {start_frame}-{end_frame}): {message}")]
    Detection {
        batch: usize,
        start_frame: u64,
        end_frame: u64,
        message: String,
    },

    /// The detector did not return one prediction list per frame.
    #[error("Detector returned {actual} prediction lists for {expected} frames")]
    BatchSizeMismatch { expected: usize, actual: usize },

    /// Preprocessing error (frame conversion, tensor shape, etc.).
    #[error("Preprocessing error: {0}")]
    Preprocess(String),

    /// The model weights file does not exist.
    #[error("Model not found: {}", .path.display())]
    ModelNotFound { path: PathBuf },

    /// ONNX Runtime error.
    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    Onnx(String),

    /// The decode thread panicked.
    #[error("Frame grabber thread panicked")]
    WorkerPanicked,
}

impl DetectError {
    /// Whether the error came from the video rather than the model.
    pub fn is_source_error(&self) -> bool {
        matches!(self, Self::Source(e) if e.is_source_error())
    }
}

/// Result type alias for detection operations.
pub type DetectResult<T> = std::result::Result<T, DetectError>;
