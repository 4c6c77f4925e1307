//! Video decoder using FFmpeg via ffmpeg-sidecar.

use crate::probe::MediaProbe;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use fishcut_core::{FishcutError, Frame, FrameSource, Result};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Sequential RGB24 decoder for one video file.
///
/// Uses ffmpeg-sidecar to spawn FFmpeg as a subprocess that writes raw
/// frames to a pipe. This approach works without system FFmpeg development
/// headers. The child process is killed and reaped on [`FrameSource::close`]
/// or drop.
pub struct FfmpegFrameSource {
    probe: MediaProbe,
    child: Option<FfmpegChild>,
    events: Option<FfmpegIterator>,
    next_index: u64,
}

impl FfmpegFrameSource {
    /// Open a video file for decoding.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let probe = MediaProbe::probe(path.as_ref())?;
        info!(
            path = %probe.path,
            frames = probe.video.frame_count,
            fps = probe.fps(),
            "Opening video file"
        );

        let mut child = FfmpegCommand::new()
            .hide_banner()
            .input(probe.path.as_str())
            .rawvideo()
            .spawn()
            .map_err(|e| FishcutError::Decoder(format!("Failed to spawn ffmpeg: {e}")))?;

        let events = match child.iter() {
            Ok(events) => events,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FishcutError::Decoder(format!(
                    "Failed to read ffmpeg output: {e}"
                )));
            }
        };

        Ok(Self {
            probe,
            child: Some(child),
            events: Some(events),
            next_index: 0,
        })
    }

    /// Get the file path.
    pub fn path(&self) -> &str {
        &self.probe.path
    }

    pub fn probe(&self) -> &MediaProbe {
        &self.probe
    }
}

impl fmt::Debug for FfmpegFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegFrameSource")
            .field("path", &self.probe.path)
            .field("next_index", &self.next_index)
            .field("open", &self.child.is_some())
            .finish()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn total_frames(&self) -> u64 {
        self.probe.video.frame_count
    }

    fn fps(&self) -> f64 {
        self.probe.fps()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.probe.dimensions()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let events = self
            .events
            .as_mut()
            .ok_or_else(|| FishcutError::Decoder("Decoder is closed".into()))?;

        for event in events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(out) => {
                    let index = self.next_index;
                    let frame = Frame::from_rgb(index, out.width, out.height, out.data)
                        .ok_or_else(|| {
                            FishcutError::Decoder(format!(
                                "Frame {index} has an unexpected buffer size"
                            ))
                        })?;
                    self.next_index += 1;
                    return Ok(Some(frame));
                }
                FfmpegEvent::Log(LogLevel::Fatal, msg) => {
                    return Err(FishcutError::Decoder(msg));
                }
                FfmpegEvent::Log(LogLevel::Error, msg) => {
                    warn!(path = %self.probe.path, "ffmpeg: {}", msg);
                }
                FfmpegEvent::Error(msg) => {
                    return Err(FishcutError::Decoder(msg));
                }
                _ => {}
            }
        }

        debug!(path = %self.probe.path, frames = self.next_index, "End of stream");
        Ok(None)
    }

    fn close(&mut self) {
        self.events = None;
        if let Some(mut child) = self.child.take() {
            // Already exited at end of stream; kill only matters mid-decode.
            let _ = child.kill();
            let _ = child.wait();
            debug!(path = %self.probe.path, "Closed decoder");
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
