//! Encode raw RGB24 frames to an H.264 file by piping them into FFmpeg.

use fishcut_core::{FishcutError, Frame, FrameRate, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Highest x264 constant rate factor.
pub const MAX_CRF: u32 = 51;

/// Pads odd frame sizes to even ones, which yuv420p requires.
const EVEN_SIZE_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// Streaming encoder writing one frame at a time to an FFmpeg child.
///
/// A finished encoder leaves a complete file behind. An encoder that is
/// aborted or dropped before [`VideoEncoder::finish`] kills FFmpeg and
/// removes the partial output. FFmpeg's stderr is collected on a helper
/// thread and attached to encoder errors.
pub struct VideoEncoder {
    output_path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frames_written: u64,
}

impl VideoEncoder {
    /// Build the FFmpeg command arguments.
    pub fn ffmpeg_args(
        output_path: &Path,
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        crf: u32,
    ) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            // Input from pipe (raw frames)
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            "rgb24".into(),
            "-video_size".into(),
            format!("{width}x{height}"),
            "-framerate".into(),
            format!("{}/{}", frame_rate.numerator, frame_rate.denominator),
            "-i".into(),
            "pipe:0".into(),
            "-vf".into(),
            EVEN_SIZE_FILTER.into(),
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            output_path.to_string_lossy().into_owned(),
        ]
    }

    /// Spawn FFmpeg writing to `output_path`.
    pub fn spawn(
        output_path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        crf: u32,
    ) -> Result<Self> {
        let output_path = output_path.into();
        if width == 0 || height == 0 || !frame_rate.is_valid() {
            return Err(FishcutError::InvalidParameter(format!(
                "Cannot encode {width}x{height} at {frame_rate}"
            )));
        }
        if crf > MAX_CRF {
            return Err(FishcutError::InvalidParameter(format!(
                "crf must be within 0..={MAX_CRF}, got {crf}"
            )));
        }
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let args = Self::ffmpeg_args(&output_path, width, height, frame_rate, crf);
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FishcutError::Encoder(format!("Failed to spawn ffmpeg: {e}")))?;

        let pipes = child.stdin.take().zip(child.stderr.take());
        let Some((stdin, stderr)) = pipes else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FishcutError::Encoder("Failed to open ffmpeg pipes".into()));
        };
        let stderr = match collect_stderr(stderr) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FishcutError::Encoder(format!(
                    "Failed to start ffmpeg stderr reader: {e}"
                )));
            }
        };

        debug!(path = %output_path.display(), width, height, %frame_rate, "Started encoder");
        Ok(Self {
            output_path,
            width,
            height,
            child: Some(child),
            stdin: Some(stdin),
            stderr: Some(stderr),
            frames_written: 0,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame. Its size must match the encoder's.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(FishcutError::InvalidParameter(format!(
                "Frame {} is {}x{}, encoder expects {}x{}",
                frame.index, frame.width, frame.height, self.width, self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| FishcutError::Encoder("Encoder is closed".into()))?;
        if let Err(e) = stdin.write_all(&frame.data) {
            // Usually a broken pipe: FFmpeg has exited and said why on stderr.
            drop(self.stdin.take());
            if let Some(mut child) = self.child.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
            let _ = std::fs::remove_file(&self.output_path);
            return Err(FishcutError::Encoder(with_stderr(
                format!("Failed to write frame {}: {e}", frame.index),
                &self.take_stderr(),
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Everything FFmpeg wrote to stderr. Call only once the child has exited.
    fn take_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    /// Close the pipe and wait for FFmpeg to finish the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        // Close stdin to signal end-of-stream
        drop(self.stdin.take());

        let mut child = self
            .child
            .take()
            .ok_or_else(|| FishcutError::Encoder("Encoder is closed".into()))?;
        let status = child
            .wait()
            .map_err(|e| FishcutError::Encoder(format!("Failed to wait for ffmpeg: {e}")))?;

        let stderr = self.take_stderr();
        if !status.success() {
            let _ = std::fs::remove_file(&self.output_path);
            return Err(FishcutError::Encoder(with_stderr(
                format!("ffmpeg exited with status: {status}"),
                &stderr,
            )));
        }
        if !stderr.is_empty() {
            warn!(path = %self.output_path.display(), "ffmpeg: {}", stderr);
        }

        debug!(
            path = %self.output_path.display(),
            frames = self.frames_written,
            "Finished encoding"
        );
        Ok(self.output_path.clone())
    }

    /// Kill FFmpeg and delete the partial file.
    pub fn abort(mut self) {
        self.kill_and_remove();
    }

    fn kill_and_remove(&mut self) {
        drop(self.stdin.take());
        // The reader thread ends on its own once the pipe closes.
        drop(self.stderr.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            if self.output_path.exists() {
                if let Err(e) = std::fs::remove_file(&self.output_path) {
                    warn!(path = %self.output_path.display(), "Failed to remove partial output: {}", e);
                }
            }
            debug!(path = %self.output_path.display(), "Aborted encoder");
        }
    }
}

fn collect_stderr(mut stderr: ChildStderr) -> std::io::Result<JoinHandle<String>> {
    std::thread::Builder::new()
        .name("ffmpeg-stderr".into())
        .spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        })
}

fn with_stderr(message: String, stderr: &str) -> String {
    if stderr.is_empty() {
        message
    } else {
        format!("{message}: {stderr}")
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        self.kill_and_remove();
    }
}
