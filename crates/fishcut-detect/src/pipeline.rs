//! Detection over one whole video.
//!
//! The calling thread drives inference; decoding runs on the grabber's
//! thread. Progress is reported through a callback of [`PipelineEvent`]s so
//! the pipeline has no opinion about how (or whether) it is displayed.

use crate::aggregator::DetectionAggregator;
use crate::detector::Detector;
use crate::error::DetectResult;
use crate::grabber::{BatchPoll, GrabberConfig, ThreadedFrameGrabber};
use crate::runner::BatchInferenceRunner;
use crate::state::PipelineState;
use fishcut_core::{CancelToken, FramePredictions, FrameRange, FrameSource, PipelineConfig};
use fishcut_media::{AnnotateConfig, FfmpegFrameSource, VideoAnnotator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Progress notifications from one video run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// The video is open and decoding has started.
    Started {
        total_frames: u64,
        total_batches: usize,
        fps: f64,
    },
    /// One batch went through the detector.
    BatchCompleted {
        batch: usize,
        total_batches: usize,
        /// Inference throughput for this batch.
        fps: f64,
    },
    /// Share of batches done, 0 to 100.
    Progress(u8),
    Log(String),
}

/// Optional outputs of a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Write an annotated copy of the video here (`.mp4`).
    pub annotate_output: Option<PathBuf>,
    pub annotate: AnnotateConfig,
    /// Keep per-frame detections in [`VideoDetections::predictions`].
    pub keep_predictions: bool,
}

/// Everything a run found.
#[derive(Debug, Clone)]
pub struct VideoDetections {
    pub total_frames: u64,
    pub fps: f64,
    pub total_batches: usize,
    pub batches_processed: usize,
    /// Ascending indices of frames with at least one detection.
    pub frames_with_detections: Vec<u64>,
    /// Detections per frame, filled when `keep_predictions` is set.
    pub predictions: FramePredictions,
    /// Gap-tolerant ranges before buffer expansion.
    pub ranges: Vec<FrameRange>,
    /// Ranges padded by the before/after buffers and re-merged.
    pub expanded_ranges: Vec<FrameRange>,
    /// Mean per-batch inference throughput.
    pub average_fps: f64,
    /// The run stopped early on request; results cover the batches done.
    pub cancelled: bool,
    pub annotated_output: Option<PathBuf>,
}

/// Run detection over every frame of `source`.
///
/// Cancellation is checked before each batch is requested. A cancelled run
/// is not an error: it returns the results for the batches completed so far
/// with `cancelled` set, and any annotated output is discarded. Decode and
/// detection failures abort the run.
pub fn process_video<S>(
    source: S,
    detector: &mut dyn Detector,
    config: &PipelineConfig,
    options: &PipelineOptions,
    cancel: &CancelToken,
    mut on_event: impl FnMut(PipelineEvent),
) -> DetectResult<VideoDetections>
where
    S: FrameSource + 'static,
{
    config.validate()?;

    let grabber_config = GrabberConfig {
        input_size: detector.input_size(),
        ..GrabberConfig::from(config)
    };
    let state = Arc::new(PipelineState::new(cancel.clone()));
    let mut grabber = ThreadedFrameGrabber::open(source, grabber_config, Arc::clone(&state))?;

    let total_frames = grabber.total_frames();
    let total_batches = grabber.total_batch_count();
    let fps = grabber.fps();
    info!(total_frames, total_batches, fps, "Processing video");
    on_event(PipelineEvent::Started {
        total_frames,
        total_batches,
        fps,
    });

    let mut annotator = match &options.annotate_output {
        Some(path) => {
            let (width, height) = grabber.dimensions();
            Some(VideoAnnotator::create(
                path,
                fps,
                width,
                height,
                &options.annotate,
            )?)
        }
        None => None,
    };

    let mut aggregator = DetectionAggregator::new();
    if options.keep_predictions {
        aggregator = aggregator.keeping_predictions();
    }
    let mut runner = BatchInferenceRunner::new(detector, config);
    let mut batches_processed = 0usize;
    let mut fps_sum = 0.0;

    while !cancel.is_cancelled() {
        let batch = match grabber.next_batch()? {
            BatchPoll::Ready(batch) => batch,
            BatchPoll::Pending => continue,
            BatchPoll::Finished => break,
        };

        let output = runner.run(&batch)?;
        if let Some(annotator) = annotator.as_mut() {
            annotator.annotate_batch(&batch.frames, &output.predictions)?;
        }
        aggregator.record_batch(&batch.frames, &output.predictions);
        state.add_processed(batch.len() as u64);

        batches_processed += 1;
        fps_sum += output.fps();
        on_event(PipelineEvent::BatchCompleted {
            batch: batch.index,
            total_batches,
            fps: output.fps(),
        });
        on_event(PipelineEvent::Progress(percent(
            batches_processed,
            total_batches,
        )));
    }

    let cancelled = cancel.is_cancelled();
    // Stop the decoder before finalising the output file.
    drop(grabber);

    let annotated_output = match annotator {
        Some(annotator) if cancelled => {
            debug!("Discarding annotated output of cancelled run");
            annotator.abort();
            None
        }
        Some(annotator) => Some(annotator.finish()?),
        None => None,
    };

    // Container frame counts are estimates; clamp against what was decoded.
    let frames_processed = state.frames_processed();
    if frames_processed > total_frames {
        debug!(
            reported = total_frames,
            decoded = frames_processed,
            "Video is longer than reported"
        );
    }
    let video_frames = total_frames.max(frames_processed);

    let frame_buffer = config.frame_buffer_frames(fps);
    let ranges = aggregator.ranges(frame_buffer);
    let expanded_ranges = aggregator.expanded_ranges(
        frame_buffer,
        fps,
        config.buffer_before,
        config.buffer_after,
        video_frames,
    );
    let average_fps = if batches_processed > 0 {
        fps_sum / batches_processed as f64
    } else {
        0.0
    };
    let (frames_with_detections, predictions) = aggregator.into_parts();

    if !cancelled {
        on_event(PipelineEvent::Progress(100));
    }
    info!(
        average_fps = format_args!("{:.2}", average_fps),
        frames = frames_with_detections.len(),
        ranges = expanded_ranges.len(),
        cancelled,
        "Video processed"
    );
    on_event(PipelineEvent::Log(format!(
        "Found {} frames with detections in {} ranges",
        frames_with_detections.len(),
        expanded_ranges.len()
    )));

    Ok(VideoDetections {
        total_frames,
        fps,
        total_batches,
        batches_processed,
        frames_with_detections,
        predictions,
        ranges,
        expanded_ranges,
        average_fps,
        cancelled,
        annotated_output,
    })
}

/// Open `path` with FFmpeg and run [`process_video`] on it.
pub fn process_video_file(
    path: &Path,
    detector: &mut dyn Detector,
    config: &PipelineConfig,
    options: &PipelineOptions,
    cancel: &CancelToken,
    on_event: impl FnMut(PipelineEvent),
) -> DetectResult<VideoDetections> {
    let source = FfmpegFrameSource::open(path)?;
    process_video(source, detector, config, options, cancel, on_event)
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockDetector;
    use crate::error::DetectError;
    use fishcut_core::SyntheticFrameSource;

    fn config(batch_size: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            max_queued_batches: 2,
            poll_interval_ms: 10,
            ..Default::default()
        }
    }

    fn source(frames: u64) -> SyntheticFrameSource {
        SyntheticFrameSource::open(frames, 30.0, 16, 16).unwrap()
    }

    #[test]
    fn test_full_run() {
        let mut detector = MockDetector::new()
            .with_fixed_frames((100..=110).chain(200..=210))
            .with_input_size((16, 16));
        let config = PipelineConfig {
            frame_buffer_seconds: 0,
            buffer_before: 1.0,
            buffer_after: 1.0,
            ..config(32)
        };
        let mut events = Vec::new();
        let result = process_video(
            source(300),
            &mut detector,
            &config,
            &PipelineOptions::default(),
            &CancelToken::new(),
            |e| events.push(e),
        )
        .unwrap();

        assert!(!result.cancelled);
        assert_eq!(result.total_batches, 10);
        assert_eq!(result.batches_processed, 10);
        assert_eq!(result.frames_with_detections.len(), 22);
        assert_eq!(
            result.ranges,
            vec![FrameRange::new(100, 110), FrameRange::new(200, 210)]
        );
        assert_eq!(
            result.expanded_ranges,
            vec![FrameRange::new(70, 140), FrameRange::new(170, 240)]
        );
        assert!(result.predictions.is_empty());

        assert!(matches!(events[0], PipelineEvent::Started { total_batches: 10, .. }));
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 11);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
    }

    #[test]
    fn test_video_longer_than_reported() {
        // Reports 100 frames, decodes 128: the fourth batch is full.
        let mut detector = MockDetector::new()
            .with_fixed_frames([110])
            .with_input_size((16, 16));
        let config = PipelineConfig {
            buffer_before: 1.0,
            buffer_after: 1.0,
            ..config(32)
        };
        let result = process_video(
            SyntheticFrameSource::open(128, 30.0, 16, 16)
                .unwrap()
                .with_reported_frames(100),
            &mut detector,
            &config,
            &PipelineOptions::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap();

        assert_eq!(result.total_batches, 4);
        assert_eq!(result.batches_processed, 4);
        assert_eq!(result.frames_with_detections, vec![110]);
        assert_eq!(result.expanded_ranges, vec![FrameRange::new(80, 127)]);
        assert!(result.expanded_ranges[0].contains(110));
    }

    #[test]
    fn test_gap_tolerance_uses_fps() {
        // One second at 30 fps: a frame at most 30 after the range end joins it.
        let mut detector = MockDetector::new().with_fixed_frames([10, 40, 71, 100]);
        let result = process_video(
            source(128),
            &mut detector,
            &config(16),
            &PipelineOptions::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap();
        assert_eq!(
            result.ranges,
            vec![FrameRange::new(10, 40), FrameRange::new(71, 100)]
        );
    }

    #[test]
    fn test_cancel_after_n_batches() {
        let cancel = CancelToken::new();
        let mut detector = MockDetector::new().with_pattern(|_| true);
        let log = detector.call_log();
        let mut batches_seen = 0;
        let trigger = cancel.clone();

        let result = process_video(
            source(1000),
            &mut detector,
            &config(10),
            &PipelineOptions::default(),
            &cancel,
            |e| {
                if let PipelineEvent::BatchCompleted { .. } = e {
                    batches_seen += 1;
                    if batches_seen == 3 {
                        trigger.cancel();
                    }
                }
            },
        )
        .expect("cancellation is not an error");

        assert!(result.cancelled);
        assert_eq!(result.batches_processed, 3);
        assert_eq!(result.frames_with_detections, (0..30).collect::<Vec<u64>>());
        assert_eq!(result.ranges, vec![FrameRange::new(0, 29)]);
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_detection_failure_is_fatal() {
        let mut detector = MockDetector::new().failing_on_batch(2);
        let err = process_video(
            source(100),
            &mut detector,
            &config(10),
            &PipelineOptions::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap_err();
        match err {
            DetectError::Detection {
                batch,
                start_frame,
                end_frame,
                ..
            } => assert_eq!((batch, start_frame, end_frame), (2, 20, 29)),
            other => panic!("expected detection error, got {other}"),
        }
    }

    #[test]
    fn test_decode_failure_is_fatal() {
        let mut detector = MockDetector::new();
        let err = process_video(
            source(100).failing_at(55),
            &mut detector,
            &config(10),
            &PipelineOptions::default(),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap_err();
        assert!(err.is_source_error());
    }

    #[test]
    fn test_keep_predictions() {
        let mut detector = MockDetector::new().with_fixed_frames([3]);
        let options = PipelineOptions {
            keep_predictions: true,
            ..Default::default()
        };
        let result = process_video(
            source(8),
            &mut detector,
            &config(4),
            &options,
            &CancelToken::new(),
            |_| {},
        )
        .unwrap();
        assert_eq!(result.predictions.len(), 1);
        assert_eq!(result.predictions[&3][0].label, "fish");
    }

    #[test]
    fn test_invalid_config() {
        let mut detector = MockDetector::new();
        let result = process_video(
            source(8),
            &mut detector,
            &PipelineConfig {
                prediction_threshold: 2.0,
                ..Default::default()
            },
            &PipelineOptions::default(),
            &CancelToken::new(),
            |_| {},
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(4, 4), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
