//! Background processing of a list of videos.
//!
//! The worker owns the detector and runs [`process_video`] for each input in
//! turn on its own thread. Everything it has to say goes out as
//! [`WorkerEvent`]s on a channel, so any front end (terminal, GUI, service)
//! can follow along without the pipeline knowing about it.

use crate::detector::Detector;
use crate::error::{DetectError, DetectResult};
use crate::pipeline::{process_video, PipelineEvent, PipelineOptions, VideoDetections};
use crossbeam_channel::{unbounded, Receiver, Sender};
use fishcut_core::{CancelToken, FrameRange, FrameSource, PipelineConfig};
use fishcut_media::annotate::annotated_output_path;
use fishcut_media::{AnnotateConfig, FfmpegFrameSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Opens a video for reading.
pub type SourceOpener =
    Box<dyn Fn(&Path) -> fishcut_core::Result<Box<dyn FrameSource>> + Send + 'static>;

/// Summary of one processed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub path: PathBuf,
    pub fps: f64,
    pub total_frames: u64,
    pub batches_processed: usize,
    pub frames_with_detections: usize,
    /// Ranges to keep, after buffer expansion.
    pub ranges: Vec<FrameRange>,
    /// `ranges` as `HH:MM:SS.mmm` start/end pairs.
    pub timecodes: Vec<(String, String)>,
    pub average_fps: f64,
    pub cancelled: bool,
    pub annotated_output: Option<PathBuf>,
}

impl VideoReport {
    pub fn new(path: &Path, detections: &VideoDetections) -> Self {
        Self {
            path: path.to_path_buf(),
            fps: detections.fps,
            total_frames: detections.total_frames,
            batches_processed: detections.batches_processed,
            frames_with_detections: detections.frames_with_detections.len(),
            ranges: detections.expanded_ranges.clone(),
            timecodes: detections
                .expanded_ranges
                .iter()
                .map(|r| r.to_timecodes(detections.fps))
                .collect(),
            average_fps: detections.average_fps,
            cancelled: detections.cancelled,
            annotated_output: detections.annotated_output.clone(),
        }
    }
}

/// Messages published by a running worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    VideoStarted { index: usize, path: PathBuf },
    /// Progress from the video currently being processed.
    Video { index: usize, event: PipelineEvent },
    VideoFinished { index: usize, report: VideoReport },
    /// The video could not be processed; the worker moves on.
    VideoFailed {
        index: usize,
        path: PathBuf,
        error: String,
    },
    /// Always the last event.
    Finished {
        processed: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Output settings for a worker run.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Write annotated copies of each video into this folder.
    pub annotate_dir: Option<PathBuf>,
    pub annotate: AnnotateConfig,
}

/// Handle to a running worker.
pub struct WorkerHandle {
    events: Receiver<WorkerEvent>,
    cancel: CancelToken,
    thread: Option<JoinHandle<Vec<VideoReport>>>,
}

impl WorkerHandle {
    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    /// Ask the worker to stop. The current video ends early with partial
    /// results and no further videos are started.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker to finish and return the reports of every video
    /// that completed.
    pub fn join(mut self) -> DetectResult<Vec<VideoReport>> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| DetectError::WorkerPanicked),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.cancel.cancel();
            let _ = handle.join();
        }
    }
}

/// Spawns detection workers.
pub struct DetectionWorker;

impl DetectionWorker {
    /// Process `videos` with FFmpeg decoding.
    pub fn spawn(
        videos: Vec<PathBuf>,
        config: PipelineConfig,
        detector: Box<dyn Detector>,
        options: WorkerOptions,
    ) -> DetectResult<WorkerHandle> {
        Self::spawn_with_opener(
            videos,
            config,
            detector,
            options,
            Box::new(|path: &Path| -> fishcut_core::Result<Box<dyn FrameSource>> {
                let source = FfmpegFrameSource::open(path)?;
                Ok(Box::new(source) as Box<dyn FrameSource>)
            }),
        )
    }

    /// Process `videos`, opening each one with `opener`.
    pub fn spawn_with_opener(
        videos: Vec<PathBuf>,
        config: PipelineConfig,
        mut detector: Box<dyn Detector>,
        options: WorkerOptions,
        opener: SourceOpener,
    ) -> DetectResult<WorkerHandle> {
        config.validate()?;
        if let Some(dir) = &options.annotate_dir {
            std::fs::create_dir_all(dir).map_err(fishcut_core::FishcutError::from)?;
        }

        let (sender, events) = unbounded();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("fishcut-worker".into())
            .spawn(move || {
                run_videos(&videos, &config, detector.as_mut(), &options, &opener, &token, &sender)
            })
            .map_err(|e| {
                fishcut_core::FishcutError::Internal(format!("Failed to spawn worker: {e}"))
            })?;

        Ok(WorkerHandle {
            events,
            cancel,
            thread: Some(thread),
        })
    }
}

fn run_videos(
    videos: &[PathBuf],
    config: &PipelineConfig,
    detector: &mut dyn Detector,
    options: &WorkerOptions,
    opener: &SourceOpener,
    cancel: &CancelToken,
    events: &Sender<WorkerEvent>,
) -> Vec<VideoReport> {
    // A dropped receiver only means nobody is listening.
    let publish = |event: WorkerEvent| {
        let _ = events.send(event);
    };
    let mut reports = Vec::new();
    let mut failed = 0;

    for (index, path) in videos.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        info!(index, total = videos.len(), path = %path.display(), "Starting video");
        publish(WorkerEvent::VideoStarted {
            index,
            path: path.clone(),
        });

        let result = opener(path).map_err(DetectError::from).and_then(|source| {
            let pipeline_options = PipelineOptions {
                annotate_output: options
                    .annotate_dir
                    .as_deref()
                    .map(|dir| annotated_output_path(dir, path)),
                annotate: options.annotate.clone(),
                keep_predictions: false,
            };
            process_video(source, detector, config, &pipeline_options, cancel, |event| {
                publish(WorkerEvent::Video { index, event })
            })
        });

        match result {
            Ok(detections) => {
                let report = VideoReport::new(path, &detections);
                if report.cancelled {
                    warn!(path = %path.display(), "Video cancelled, results are partial");
                }
                reports.push(report.clone());
                publish(WorkerEvent::VideoFinished { index, report });
            }
            Err(err) => {
                error!(path = %path.display(), "Video failed: {}", err);
                failed += 1;
                publish(WorkerEvent::VideoFailed {
                    index,
                    path: path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let cancelled = cancel.is_cancelled();
    info!(processed = reports.len(), failed, cancelled, "Worker finished");
    publish(WorkerEvent::Finished {
        processed: reports.len(),
        failed,
        cancelled,
    });
    reports
}
