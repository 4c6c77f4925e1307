//! Sequential frame sources.

use crate::error::{FishcutError, Result};
use crate::frame::{Frame, FrameSize};
use std::time::Duration;

/// A decoded, strictly ordered stream of video frames.
///
/// Implementors are opened by their own constructor, which fails with an
/// I/O-class [`FishcutError`] when the video cannot be used. A source is
/// driven by a single owner; it is `Send` so it can move onto a decode thread.
pub trait FrameSource: Send {
    /// Number of frames reported by the container.
    fn total_frames(&self) -> u64;

    /// Frames per second.
    fn fps(&self) -> f64;

    /// Frame dimensions `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Decode the next frame.
    ///
    /// Frames come out with indices `0, 1, 2, ...`; `Ok(None)` marks the end
    /// of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the decode handle. Calling it more than once is a no-op.
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn total_frames(&self) -> u64 {
        (**self).total_frames()
    }

    fn fps(&self) -> f64 {
        (**self).fps()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// In-memory source producing colour-bar frames.
///
/// Useful for tests and dry runs. Frame `i` carries a distinct fill value in
/// its first pixel so ordering can be checked downstream.
#[derive(Debug, Clone)]
pub struct SyntheticFrameSource {
    size: FrameSize,
    fps: f64,
    total_frames: u64,
    reported_frames: Option<u64>,
    next_index: u64,
    delay: Option<Duration>,
    fail_at: Option<u64>,
    closed: bool,
}

impl SyntheticFrameSource {
    /// Open a synthetic video. Zero frames is rejected like an unreadable file.
    pub fn open(total_frames: u64, fps: f64, width: u32, height: u32) -> Result<Self> {
        if total_frames == 0 {
            return Err(FishcutError::Media("Video has no frames".into()));
        }
        if width == 0 || height == 0 {
            return Err(FishcutError::Media(format!(
                "Invalid video dimensions {width}x{height}"
            )));
        }
        Ok(Self {
            size: FrameSize::new(width, height),
            fps,
            total_frames,
            reported_frames: None,
            next_index: 0,
            delay: None,
            fail_at: None,
            closed: false,
        })
    }

    /// Sleep this long before producing each frame (simulates a slow decoder).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with a decoder error when frame `index` is requested.
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Report `frames` from [`FrameSource::total_frames`] while still
    /// streaming the real number. Containers often carry an estimate.
    pub fn with_reported_frames(mut self, frames: u64) -> Self {
        self.reported_frames = Some(frames);
        self
    }

    /// Number of frames handed out so far.
    pub fn frames_decoded(&self) -> u64 {
        self.next_index
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSource for SyntheticFrameSource {
    fn total_frames(&self) -> u64 {
        self.reported_frames.unwrap_or(self.total_frames)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Err(FishcutError::Decoder("Source is closed".into()));
        }
        if self.next_index >= self.total_frames {
            return Ok(None);
        }
        if self.fail_at == Some(self.next_index) {
            return Err(FishcutError::Decoder(format!(
                "Corrupt frame {}",
                self.next_index
            )));
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let index = self.next_index;
        let mut frame = Frame::test_pattern(index, self.size.width, self.size.height);
        let marker = (index % 256) as u8;
        frame.put_pixel(0, 0, [marker, marker, marker]);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
