//! Drawing detections onto frames and writing annotated videos.

use crate::encoder::VideoEncoder;
use crate::font;
use fishcut_core::{Detection, FishcutError, Frame, FrameRate, Result};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Space between the label text and the edge of its tab.
const LABEL_PADDING: u32 = 2;

/// Colours and sizes used when drawing detections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStyle {
    pub box_color: [u8; 3],
    pub text_color: [u8; 3],
    /// Box outline thickness in pixels.
    pub line_width: u32,
    /// Label height in pixels.
    pub font_size: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: [255, 0, 255],
            text_color: [255, 255, 255],
            line_width: 2,
            font_size: 16.0,
        }
    }
}

/// Settings for annotated output videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// x264 constant rate factor (0-51, lower = better).
    pub crf: u32,
    pub style: AnnotationStyle,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            crf: 23,
            style: AnnotationStyle::default(),
        }
    }
}

/// Label drawn above each box.
pub fn detection_label(detection: &Detection) -> String {
    format!("{:.2} {}", detection.confidence, detection.label)
}

/// Draw boxes and labels for `detections` onto `frame` in place.
///
/// Boxes are clamped to the frame; boxes with no area after clamping are
/// skipped. The label tab sits above the box, or just inside its top edge
/// when there is no room above.
pub fn draw_detections(frame: &mut Frame, detections: &[Detection], style: &AnnotationStyle) {
    let (width, height) = (frame.width, frame.height);
    let Some(mut canvas) =
        ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, frame.data.as_mut_slice())
    else {
        return;
    };
    let box_color = Rgb(style.box_color);

    for detection in detections {
        let bbox = detection.bbox.clamp_to(width, height);
        if !bbox.is_valid() {
            continue;
        }
        let x0 = bbox.xmin.floor() as u32;
        let y0 = bbox.ymin.floor() as u32;
        let x1 = (bbox.xmax.ceil() as u32).min(width - 1);
        let y1 = (bbox.ymax.ceil() as u32).min(height - 1);
        let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);

        // Thick outlines are nested one-pixel rectangles.
        for inset in 0..style.line_width.max(1) {
            if 2 * inset >= w || 2 * inset >= h {
                break;
            }
            let rect = Rect::at((x0 + inset) as i32, (y0 + inset) as i32)
                .of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(&mut canvas, rect, box_color);
        }

        let Some(font) = font::label_font() else {
            continue;
        };
        let label = detection_label(detection);
        let (text_w, text_h) = font::text_size(&label, style.font_size);
        let tab_h = text_h + 2 * LABEL_PADDING;
        let tab_y = if y0 >= tab_h { y0 - tab_h } else { y0 };
        let tab = Rect::at(x0 as i32, tab_y as i32).of_size(text_w + 2 * LABEL_PADDING, tab_h);
        draw_filled_rect_mut(&mut canvas, tab, box_color);
        draw_text_mut(
            &mut canvas,
            Rgb(style.text_color),
            (x0 + LABEL_PADDING) as i32,
            (tab_y + LABEL_PADDING) as i32,
            style.font_size,
            font,
            &label,
        );
    }
}

/// Copy of `frame` with detections drawn on it.
pub fn annotate_frame(frame: &Frame, detections: &[Detection], style: &AnnotationStyle) -> Frame {
    let mut annotated = frame.clone();
    draw_detections(&mut annotated, detections, style);
    annotated
}

/// Output path for the annotated copy of `video` inside `dir`.
pub fn annotated_output_path(dir: &Path, video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    dir.join(format!("{stem}_annotated.mp4"))
}

/// Writes a copy of a video with detections drawn on every frame.
///
/// Output is always an `.mp4` container. Dropping the annotator without
/// calling [`VideoAnnotator::finish`] deletes the partial file.
pub struct VideoAnnotator {
    encoder: VideoEncoder,
    style: AnnotationStyle,
}

impl VideoAnnotator {
    /// Start writing to `path` (extension forced to `.mp4`).
    pub fn create(
        path: impl AsRef<Path>,
        fps: f64,
        width: u32,
        height: u32,
        config: &AnnotateConfig,
    ) -> Result<Self> {
        let output = path.as_ref().with_extension("mp4");
        let encoder = VideoEncoder::spawn(
            output,
            width,
            height,
            FrameRate::from_fps_f64(fps),
            config.crf,
        )?;
        Ok(Self {
            encoder,
            style: config.style,
        })
    }

    pub fn output_path(&self) -> &Path {
        self.encoder.output_path()
    }

    pub fn frames_written(&self) -> u64 {
        self.encoder.frames_written()
    }

    /// Draw and write one batch. `predictions[i]` belongs to `frames[i]`.
    pub fn annotate_batch(&mut self, frames: &[Frame], predictions: &[Vec<Detection>]) -> Result<()> {
        if frames.len() != predictions.len() {
            return Err(FishcutError::InvalidParameter(format!(
                "{} frames but {} prediction lists",
                frames.len(),
                predictions.len()
            )));
        }
        for (frame, detections) in frames.iter().zip(predictions) {
            let annotated = annotate_frame(frame, detections, &self.style);
            self.encoder.write_frame(&annotated)?;
        }
        Ok(())
    }

    /// Finalize the file and return its path.
    pub fn finish(self) -> Result<PathBuf> {
        self.encoder.finish()
    }

    /// Stop writing and delete the partial file.
    pub fn abort(self) {
        self.encoder.abort();
    }
}
