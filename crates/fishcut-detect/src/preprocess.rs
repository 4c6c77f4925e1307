//! Batch assembly and model input preparation.
//!
//! Frames are letterboxed into the model's input size (aspect ratio kept,
//! borders padded with grey 114), normalised to `[0, 1]` and stacked into a
//! single `[N, 3, H, W]` tensor. The original frames travel alongside the
//! tensor so detections can be drawn on full-resolution pixels later.

use crate::error::{DetectError, DetectResult};
use fishcut_core::{BoundingBox, Frame};
use image::imageops::{self, FilterType};
use ndarray::{s, Array4, ArrayViewMut3};

/// Grey level used for letterbox padding.
pub const PAD_VALUE: u8 = 114;

/// Mapping between source pixels and model input pixels for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Source-to-model scale factor.
    pub scale: f32,
    /// Left padding in whole model pixels.
    pub pad_x: u32,
    /// Top padding in whole model pixels.
    pub pad_y: u32,
    /// Size of the scaled image inside the model input.
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    /// Fit a `width` x `height` frame into `target`.
    pub fn fit(width: u32, height: u32, target: (u32, u32)) -> Self {
        let (tw, th) = target;
        let scale = (tw as f32 / width as f32).min(th as f32 / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, tw);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, th);
        Self {
            scale,
            pad_x: (tw - scaled_width) / 2,
            pad_y: (th - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a box in model coordinates back to source pixel coordinates.
    pub fn to_source(&self, bbox: &BoundingBox) -> BoundingBox {
        let (pad_x, pad_y) = (self.pad_x as f32, self.pad_y as f32);
        BoundingBox::new(
            (bbox.xmin - pad_x) / self.scale,
            (bbox.ymin - pad_y) / self.scale,
            (bbox.xmax - pad_x) / self.scale,
            (bbox.ymax - pad_y) / self.scale,
        )
    }
}

/// Model-ready input for one batch.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// `[N, 3, H, W]` RGB tensor with values in `[0, 1]`.
    pub tensor: Array4<f32>,
    /// Letterbox used for each frame, by position.
    pub letterboxes: Vec<Letterbox>,
}

impl BatchInput {
    pub fn len(&self) -> usize {
        self.letterboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letterboxes.is_empty()
    }
}

/// An immutable group of consecutive frames plus their model input.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of this batch in the video, 0-based.
    pub index: usize,
    pub input: BatchInput,
    pub frames: Vec<Frame>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the first frame in the batch.
    pub fn first_frame(&self) -> u64 {
        self.frames.first().map_or(0, |f| f.index)
    }

    /// Index of the last frame in the batch.
    pub fn last_frame(&self) -> u64 {
        self.frames.last().map_or(0, |f| f.index)
    }
}

/// Converts frames into model input of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct BatchPreprocessor {
    target: (u32, u32),
}

impl BatchPreprocessor {
    pub fn new(target: (u32, u32)) -> Self {
        Self { target }
    }

    /// Model input size `(width, height)`.
    pub fn target_size(&self) -> (u32, u32) {
        self.target
    }

    /// Build the model input for `frames`. The frames are only read.
    pub fn preprocess(&self, frames: &[Frame]) -> DetectResult<BatchInput> {
        let (tw, th) = self.target;
        if tw == 0 || th == 0 {
            return Err(DetectError::Preprocess(format!(
                "Invalid model input size {tw}x{th}"
            )));
        }
        if frames.is_empty() {
            return Err(DetectError::Preprocess("Cannot build an empty batch".into()));
        }

        let pad = PAD_VALUE as f32 / 255.0;
        let mut tensor = Array4::<f32>::from_elem((frames.len(), 3, th as usize, tw as usize), pad);
        let mut letterboxes = Vec::with_capacity(frames.len());

        for (i, frame) in frames.iter().enumerate() {
            if frame.width == 0 || frame.height == 0 {
                return Err(DetectError::Preprocess(format!(
                    "Frame {} has no pixels",
                    frame.index
                )));
            }
            let letterbox = Letterbox::fit(frame.width, frame.height, self.target);
            resize_into(frame, &letterbox, tensor.slice_mut(s![i, .., .., ..]))?;
            letterboxes.push(letterbox);
        }

        Ok(BatchInput {
            tensor,
            letterboxes,
        })
    }

    /// Assemble batch `index` from `frames`, keeping the frames alongside.
    pub fn make_batch(&self, index: usize, frames: Vec<Frame>) -> DetectResult<Batch> {
        let input = self.preprocess(&frames)?;
        Ok(Batch {
            index,
            input,
            frames,
        })
    }
}

/// Resize `frame` into the letterboxed region of `out` (`[3, H, W]`).
fn resize_into(
    frame: &Frame,
    letterbox: &Letterbox,
    mut out: ArrayViewMut3<'_, f32>,
) -> DetectResult<()> {
    let image = frame.as_image().ok_or_else(|| {
        DetectError::Preprocess(format!(
            "Frame {} has {} bytes for {}x{} RGB24",
            frame.index,
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;
    let resized = imageops::resize(
        &image,
        letterbox.scaled_width,
        letterbox.scaled_height,
        FilterType::Triangle,
    );

    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (off_x + x as usize, off_y + y as usize);
        for c in 0..3 {
            out[[c, y, x]] = pixel[c] as f32 / 255.0;
        }
    }
    Ok(())
}
