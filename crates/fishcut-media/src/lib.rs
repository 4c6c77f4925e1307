//! Fishcut Media - FFmpeg integration for video I/O
//!
//! This crate handles:
//! - Media file probing (ffprobe)
//! - Video decoding into RGB24 frames
//! - Drawing detections onto frames
//! - Encoding annotated frames back into a video file

pub mod annotate;
pub mod decoder;
pub mod encoder;
pub mod font;
pub mod probe;
pub mod scan;

pub use annotate::{draw_detections, AnnotateConfig, AnnotationStyle, VideoAnnotator};
pub use decoder::FfmpegFrameSource;
pub use encoder::VideoEncoder;
pub use probe::{MediaProbe, VideoStreamInfo};
pub use scan::collect_videos;

/// Check that the FFmpeg tools are reachable (call once at startup).
pub fn init() -> bool {
    let ffmpeg = which::which("ffmpeg").is_ok();
    let ffprobe = which::which("ffprobe").is_ok();
    if ffmpeg && ffprobe {
        tracing::info!("Fishcut media initialized");
    } else {
        tracing::warn!(ffmpeg, ffprobe, "FFmpeg tools not found on PATH");
    }
    ffmpeg && ffprobe
}
