//! The detection capability consumed by the pipeline.

use crate::error::{DetectError, DetectResult};
use crate::preprocess::BatchInput;
use fishcut_core::{BoundingBox, Detection, FishcutError, Frame};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A batch object detector.
///
/// `predict_batch` is synchronous and may be slow. It must return exactly one
/// prediction list per input frame, in frame order; each list keeps the
/// model's output order.
pub trait Detector: Send {
    /// Class labels indexed by class id.
    fn class_names(&self) -> &[String];

    /// Model input size `(width, height)` the preprocessor must produce.
    fn input_size(&self) -> (u32, u32);

    fn predict_batch(
        &mut self,
        frames: &[Frame],
        input: &BatchInput,
    ) -> DetectResult<Vec<Vec<Detection>>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn class_names(&self) -> &[String] {
        (**self).class_names()
    }

    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn predict_batch(
        &mut self,
        frames: &[Frame],
        input: &BatchInput,
    ) -> DetectResult<Vec<Vec<Detection>>> {
        (**self).predict_batch(frames, input)
    }
}

/// Read class names from a text file, one per line. Blank lines are skipped.
pub fn load_class_names(path: &Path) -> DetectResult<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(FishcutError::from)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

enum Hits {
    Pattern(Box<dyn Fn(u64) -> bool + Send>),
    Fixed(BTreeSet<u64>),
}

/// Deterministic detector for tests and dry runs.
///
/// Reports one centred box on every frame selected by its pattern. Each
/// call is recorded as `(first_frame, frame_count)` in a shared log.
pub struct MockDetector {
    class_names: Vec<String>,
    input_size: (u32, u32),
    hits: Hits,
    confidence: f32,
    fail_on_batch: Option<usize>,
    delay: Option<Duration>,
    batches_seen: usize,
    calls: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl MockDetector {
    /// A detector that never finds anything.
    pub fn new() -> Self {
        Self {
            class_names: vec!["fish".to_string()],
            input_size: (64, 64),
            hits: Hits::Fixed(BTreeSet::new()),
            confidence: 0.9,
            fail_on_batch: None,
            delay: None,
            batches_seen: 0,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Detect on every frame for which `hit` returns true.
    pub fn with_pattern(mut self, hit: impl Fn(u64) -> bool + Send + 'static) -> Self {
        self.hits = Hits::Pattern(Box::new(hit));
        self
    }

    /// Detect on exactly these frame indices.
    pub fn with_fixed_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.hits = Hits::Fixed(frames.into_iter().collect());
        self
    }

    /// Fail when asked to predict the `batch`-th call (0-based).
    pub fn failing_on_batch(mut self, batch: usize) -> Self {
        self.fail_on_batch = Some(batch);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sleep this long per call (simulates a slow model).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_input_size(mut self, input_size: (u32, u32)) -> Self {
        self.input_size = input_size;
        self
    }

    /// Shared log of `(first_frame, frame_count)` per call.
    pub fn call_log(&self) -> Arc<Mutex<Vec<(u64, usize)>>> {
        Arc::clone(&self.calls)
    }

    fn is_hit(&self, frame: u64) -> bool {
        match &self.hits {
            Hits::Pattern(hit) => hit(frame),
            Hits::Fixed(frames) => frames.contains(&frame),
        }
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for MockDetector {
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
        let batch = self.batches_seen;
        self.batches_seen += 1;
        self.calls
            .lock()
            .push((frames.first().map_or(0, |f| f.index), frames.len()));

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_on_batch == Some(batch) {
            return Err(DetectError::Source(FishcutError::Internal(format!(
                "mock detector failure on call {batch}"
            ))));
        }
        if input.len() != frames.len() {
            return Err(DetectError::BatchSizeMismatch {
                expected: frames.len(),
                actual: input.len(),
            });
        }

        Ok(frames
            .iter()
            .map(|frame| {
                if !self.is_hit(frame.index) {
                    return Vec::new();
                }
                let (w, h) = (frame.width as f32, frame.height as f32);
                vec![Detection::new(
                    self.class_names[0].clone(),
                    self.confidence,
                    BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.75),
                )]
            })
            .collect())
    }
}
