//! Decoded video frames in CPU memory.
//!
//! Frames are packed RGB24, which is what the decoder emits and what the
//! annotator pipes back into the encoder.

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Bytes per pixel of a packed RGB24 frame.
pub const RGB_CHANNELS: usize = 3;

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes a packed RGB24 frame of this size occupies.
    pub fn rgb_len(self) -> usize {
        self.width as usize * self.height as usize * RGB_CHANNELS
    }
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// A decoded video frame.
///
/// `index` is 0-based and strictly increasing within one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position of the frame in the video
    pub index: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Packed RGB24 pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame from raw RGB24 data.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_rgb(index: u64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != FrameSize::new(width, height).rgb_len() {
            return None;
        }
        Some(Self {
            index,
            width,
            height,
            data,
        })
    }

    /// Create a frame filled with one colour.
    pub fn solid(index: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(FrameSize::new(width, height).rgb_len())
            .collect();
        Self {
            index,
            width,
            height,
            data,
        }
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(index: u64, width: u32, height: u32) -> Self {
        const BARS: [[u8; 3]; 8] = [
            [255, 255, 255], // White
            [255, 255, 0],   // Yellow
            [0, 255, 255],   // Cyan
            [0, 255, 0],     // Green
            [255, 0, 255],   // Magenta
            [255, 0, 0],     // Red
            [0, 0, 255],     // Blue
            [0, 0, 0],       // Black
        ];

        let mut frame = Self::solid(index, width, height, [0, 0, 0]);
        for y in 0..height {
            for x in 0..width {
                let bar = (x as u64 * 8 / width.max(1) as u64) as usize;
                frame.put_pixel(x, y, BARS[bar.min(7)]);
            }
        }
        frame
    }

    /// Frame dimensions.
    #[inline]
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * RGB_CHANNELS
    }

    /// Read one pixel. Out-of-bounds coordinates return `None`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Write one pixel. Out-of-bounds writes are ignored.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.offset(x, y);
        self.data[i..i + RGB_CHANNELS].copy_from_slice(&rgb);
    }

    /// Borrow the pixels as an `image` buffer without copying.
    ///
    /// Returns `None` when `data` does not match the dimensions.
    pub fn as_image(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    /// Move the pixels into an owned `RgbImage`.
    pub fn into_image(self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data)
    }

    /// Wrap an `RgbImage` as the frame at `index`.
    pub fn from_image(index: u64, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            index,
            width,
            height,
            data: image.into_raw(),
        }
    }
}
