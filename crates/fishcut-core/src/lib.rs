//! Fishcut Core - Foundation types for the detection pipeline
//!
//! This crate provides the fundamental types used throughout fishcut:
//! - Frames and frame sources
//! - Detections and bounding boxes
//! - Frame ranges and the merge logic that builds them
//! - Pipeline configuration and cancellation

pub mod cancel;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod range;
pub mod source;
pub mod time;

pub use cancel::CancelToken;
pub use config::PipelineConfig;
pub use detection::{BoundingBox, Detection, FramePredictions};
pub use error::{FishcutError, Result};
pub use frame::{Frame, FrameSize};
pub use range::{detected_frames_to_ranges, expand_and_merge, FrameRange};
pub use source::{FrameSource, SyntheticFrameSource};
pub use time::{frame_to_timecode, FrameRate};

/// Video container extensions picked up when scanning a folder.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "m4a", "avi", "mkv", "mov", "wmv"];
