//! YOLOv8 detector backed by ONNX Runtime.
//!
//! Gated behind the `onnx` feature flag. Requires the onnxruntime shared
//! library at run time (`ort` is built with `load-dynamic`).

use crate::detector::Detector;
use crate::error::{DetectError, DetectResult};
use crate::postprocess::{decode_yolov8, DecodeParams, DEFAULT_IOU_THRESHOLD};
use crate::preprocess::BatchInput;
use fishcut_core::{Detection, Frame, PipelineConfig};
use ndarray::ArrayView3;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

fn onnx_err(e: impl std::fmt::Display) -> DetectError {
    DetectError::Onnx(e.to_string())
}

/// A loaded YOLOv8 detection model.
pub struct OnnxDetector {
    session: Session,
    class_names: Vec<String>,
    input_size: (u32, u32),
    params: DecodeParams,
}

impl OnnxDetector {
    /// Load a YOLOv8 ONNX export.
    ///
    /// The model is fed `config.input_size` letterboxed frames. Scores are
    /// decoded with the pipeline's threshold and per-frame cap; the runner
    /// applies both again, so a looser decode is harmless.
    pub fn load(
        model_path: &Path,
        class_names: Vec<String>,
        config: &PipelineConfig,
    ) -> DetectResult<Self> {
        if !model_path.is_file() {
            return Err(DetectError::ModelNotFound {
                path: model_path.to_path_buf(),
            });
        }
        info!(path = %model_path.display(), classes = class_names.len(), "Loading ONNX session");

        let session = Session::builder()
            .map_err(onnx_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(onnx_err)?
            .with_intra_threads(num_cpus::get())
            .map_err(onnx_err)?
            .commit_from_file(model_path)
            .map_err(onnx_err)?;

        info!("ONNX session loaded successfully");
        Ok(Self {
            session,
            class_names,
            input_size: config.input_size,
            params: DecodeParams {
                conf_threshold: config.prediction_threshold,
                iou_threshold: DEFAULT_IOU_THRESHOLD,
                max_detections: config.max_detections,
            },
        })
    }
}

impl Detector for OnnxDetector {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn predict_batch(
        &mut self,
        frames: &[Frame],
        input: &BatchInput,
    ) -> DetectResult<Vec<Vec<Detection>>> {
        if input.len() != frames.len() {
            return Err(DetectError::BatchSizeMismatch {
                expected: frames.len(),
                actual: input.len(),
            });
        }
        let (n, c, h, w) = input.tensor.dim();
        let data: Vec<f32> = input.tensor.iter().copied().collect();
        let tensor = Tensor::from_array(([n, c, h, w], data)).map_err(onnx_err)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(onnx_err)?;
        let (shape, values) = outputs[0].try_extract_tensor::<f32>().map_err(onnx_err)?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let &[batch, rows, anchors] = dims.as_slice() else {
            return Err(DetectError::Onnx(format!(
                "Expected a [batch, 4 + classes, anchors] output, got {dims:?}"
            )));
        };
        if batch != frames.len() {
            return Err(DetectError::BatchSizeMismatch {
                expected: frames.len(),
                actual: batch,
            });
        }
        let output = ArrayView3::from_shape((batch, rows, anchors), values)
            .map_err(|e| DetectError::Onnx(e.to_string()))?;
        debug!(batch, rows, anchors, "Decoding model output");

        Ok(frames
            .iter()
            .zip(&input.letterboxes)
            .enumerate()
            .map(|(i, (frame, letterbox))| {
                decode_yolov8(
                    output.index_axis(ndarray::Axis(0), i),
                    &self.class_names,
                    letterbox,
                    (frame.width, frame.height),
                    &self.params,
                )
            })
            .collect())
    }
}
