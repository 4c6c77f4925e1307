//! YOLOv8 output decoding.
//!
//! A YOLOv8 detection head emits, per image, a `[4 + num_classes, anchors]`
//! matrix: box centre, width and height in model pixels followed by one
//! score per class. Decoding picks the best class per anchor, drops low
//! scores, runs class-wise non-maximum suppression and maps the surviving
//! boxes back to source pixels.

use crate::preprocess::Letterbox;
use fishcut_core::{BoundingBox, Detection};
use ndarray::ArrayView2;

/// IoU above which a lower-scoring box of the same class is suppressed.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: 300,
        }
    }
}

struct Candidate {
    class: usize,
    score: f32,
    bbox: BoundingBox,
}

/// Decode one image's output into detections, highest confidence first.
///
/// Boxes are clamped to the `frame_size` source frame; boxes left without
/// area are dropped. Class ids without a name are labelled `class<id>`.
pub fn decode_yolov8(
    output: ArrayView2<'_, f32>,
    class_names: &[String],
    letterbox: &Letterbox,
    frame_size: (u32, u32),
    params: &DecodeParams,
) -> Vec<Detection> {
    let (rows, anchors) = output.dim();
    if rows <= 4 || params.max_detections == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Candidate> = (0..anchors)
        .filter_map(|j| {
            let (class, score) = (4..rows)
                .map(|r| (r - 4, output[[r, j]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if score < params.conf_threshold {
                return None;
            }
            let bbox = BoundingBox::from_center(
                output[[0, j]],
                output[[1, j]],
                output[[2, j]],
                output[[3, j]],
            );
            Some(Candidate { class, score, bbox })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= params.max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class == candidate.class && k.bbox.iou(&candidate.bbox) > params.iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .filter_map(|c| {
            let bbox = letterbox
                .to_source(&c.bbox)
                .clamp_to(frame_size.0, frame_size.1);
            if !bbox.is_valid() {
                return None;
            }
            let label = class_names
                .get(c.class)
                .cloned()
                .unwrap_or_else(|| format!("class{}", c.class));
            Some(Detection::new(label, c.score, bbox))
        })
        .collect()
}
