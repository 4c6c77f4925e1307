//! Media file probing to get metadata without full decode.

use fishcut_core::{FishcutError, FrameRate, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: String,
    /// Container format
    pub format: String,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Primary video stream
    pub video: VideoStreamInfo,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Frame count from the container, or estimated from duration.
    pub frame_count: u64,
    pub pixel_format: String,
    /// Display rotation in degrees from the stream metadata.
    pub rotation: i32,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

impl FfprobeStream {
    /// Rotation from the display matrix, or the legacy `rotate` tag.
    fn rotation(&self) -> i32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        (degrees.round() as i32).rem_euclid(360)
    }
}

impl MediaProbe {
    /// Probe a media file with ffprobe.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        if !path.exists() {
            return Err(FishcutError::NotFound(format!(
                "File not found: {}",
                path_str
            )));
        }

        let ffprobe = which::which("ffprobe")
            .map_err(|_| FishcutError::Media("ffprobe not found on PATH".into()))?;

        let output = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(FishcutError::Media(format!(
                "ffprobe failed for {}: {}",
                path_str,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe = Self::from_ffprobe_json(&path_str, &output.stdout)?;
        debug!(
            path = %probe.path,
            width = probe.video.width,
            height = probe.video.height,
            fps = probe.fps(),
            frames = probe.video.frame_count,
            "Probed video"
        );
        Ok(probe)
    }

    /// Build a probe from `ffprobe -print_format json` output.
    pub fn from_ffprobe_json(path: &str, json: &[u8]) -> Result<Self> {
        let output: FfprobeOutput = serde_json::from_slice(json)?;

        let stream = output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| FishcutError::Media(format!("No video stream found in {path}")))?;

        // FFmpeg autorotates on decode, so quarter turns swap the frame size.
        let rotation = stream.rotation();
        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 && rotation % 180 == 90 => (h, w),
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(FishcutError::Media(format!(
                    "Video stream in {path} has no dimensions"
                )))
            }
        };

        let frame_rate = stream
            .avg_frame_rate
            .as_deref()
            .and_then(FrameRate::parse)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(FrameRate::parse))
            .ok_or_else(|| FishcutError::Media(format!("Video stream in {path} has no frame rate")))?;

        let format = output.format.as_ref();
        let duration_secs = stream
            .duration
            .as_deref()
            .or_else(|| format.and_then(|f| f.duration.as_deref()))
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        // Some containers (mkv, webm) do not record a frame count.
        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .unwrap_or_else(|| (duration_secs * frame_rate.to_fps_f64()).round() as u64);

        if frame_count == 0 {
            return Err(FishcutError::Media(format!("Video {path} has no frames")));
        }

        Ok(Self {
            path: path.to_string(),
            format: format
                .and_then(|f| f.format_name.clone())
                .unwrap_or_default(),
            duration_secs,
            video: VideoStreamInfo {
                index: stream.index,
                codec: stream.codec_name.clone().unwrap_or_default(),
                width,
                height,
                frame_rate,
                frame_count,
                pixel_format: stream.pix_fmt.clone().unwrap_or_default(),
                rotation,
            },
        })
    }

    /// Frames per second of the primary video stream.
    pub fn fps(&self) -> f64 {
        self.video.frame_rate.to_fps_f64()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.video.width, self.video.height)
    }
}
