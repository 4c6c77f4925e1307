//! Fishcut Detect - Batched object detection over video
//!
//! Provides the detection pipeline:
//! - Threaded frame grabbing with a bounded batch queue
//! - Letterbox preprocessing into NCHW tensors
//! - Batch inference behind the [`Detector`] trait (ONNX Runtime with the `onnx` feature)
//! - Aggregation of detected frames into time ranges
//! - A background worker for processing many videos

pub mod aggregator;
pub mod detector;
pub mod error;
pub mod grabber;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod runner;
pub mod state;
pub mod worker;

pub use aggregator::DetectionAggregator;
pub use detector::{load_class_names, Detector, MockDetector};
pub use error::{DetectError, DetectResult};
pub use grabber::{BatchPoll, GrabberConfig, ThreadedFrameGrabber};
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;
pub use pipeline::{
    process_video, process_video_file, PipelineEvent, PipelineOptions, VideoDetections,
};
pub use postprocess::{decode_yolov8, DecodeParams};
pub use preprocess::{Batch, BatchInput, BatchPreprocessor, Letterbox};
pub use runner::{BatchInferenceRunner, BatchOutput};
pub use state::PipelineState;
pub use worker::{DetectionWorker, VideoReport, WorkerEvent, WorkerHandle, WorkerOptions};

/// Whether this build can run real models.
pub fn has_onnx_backend() -> bool {
    cfg!(feature = "onnx")
}
