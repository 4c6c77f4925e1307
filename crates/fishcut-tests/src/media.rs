//! Integration tests for FFmpeg-backed video I/O.
//!
//! Tests that shell out to FFmpeg are `#[ignore]`d by default; run them
//! with `cargo test -- --ignored` on a machine with `ffmpeg` and `ffprobe`
//! on PATH. They fail rather than skip when the tools are missing.

use fishcut_core::{
    BoundingBox, CancelToken, Detection, Frame, FrameSource, PipelineConfig, SyntheticFrameSource,
};
use fishcut_detect::{
    process_video, DetectionWorker, MockDetector, PipelineEvent, PipelineOptions, WorkerEvent,
    WorkerOptions,
};
use fishcut_media::{AnnotateConfig, FfmpegFrameSource, MediaProbe, VideoAnnotator};
use std::path::{Path, PathBuf};

const NEEDS_FFMPEG: &str = "needs ffmpeg and ffprobe on PATH";

fn require_ffmpeg() {
    assert!(fishcut_media::init(), "{NEEDS_FFMPEG}");
}

/// Encode `frames` solid grey frames into `path` and return the written file.
fn write_clip(path: &Path, frames: u64, width: u32, height: u32) -> PathBuf {
    let mut annotator =
        VideoAnnotator::create(path, 25.0, width, height, &AnnotateConfig::default()).unwrap();
    let batch: Vec<Frame> = (0..frames)
        .map(|i| Frame::solid(i, width, height, [90, 90, 90]))
        .collect();
    let predictions = vec![Vec::new(); batch.len()];
    annotator.annotate_batch(&batch, &predictions).unwrap();
    annotator.finish().unwrap()
}

#[test]
#[ignore = "needs ffmpeg and ffprobe on PATH"]
fn annotated_clip_decodes_back() {
    require_ffmpeg();
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    let mut annotator = VideoAnnotator::create(
        dir.path().join("boxes.mov"),
        25.0,
        64,
        48,
        &AnnotateConfig::default(),
    )
    .unwrap();
    assert_eq!(annotator.output_path(), dir.path().join("boxes.mp4"));

    let frames: Vec<Frame> = (0..10).map(|i| Frame::solid(i, 64, 48, [0, 0, 0])).collect();
    let predictions: Vec<Vec<Detection>> = frames
        .iter()
        .map(|_| {
            vec![Detection::new(
                "fish",
                0.9,
                BoundingBox::new(8.0, 20.0, 56.0, 44.0),
            )]
        })
        .collect();
    annotator.annotate_batch(&frames, &predictions).unwrap();
    assert_eq!(annotator.frames_written(), 10);
    let path = annotator.finish().unwrap();

    let probe = MediaProbe::probe(&path).unwrap();
    assert_eq!(probe.dimensions(), (64, 48));
    assert_eq!(probe.video.frame_count, 10);

    let mut source = FfmpegFrameSource::open(&path).unwrap();
    let mut decoded = 0;
    while let Some(frame) = source.next_frame().unwrap() {
        assert_eq!(frame.index, decoded);
        assert_eq!((frame.width, frame.height), (64, 48));
        decoded += 1;
    }
    source.close();
    assert_eq!(decoded, 10);
}

#[test]
#[ignore = "needs ffmpeg and ffprobe on PATH"]
fn odd_sized_frames_encode_with_even_padding() {
    require_ffmpeg();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let clip = write_clip(&dir.path().join("odd.mp4"), 5, 63, 47);

    let probe = MediaProbe::probe(&clip).unwrap();
    assert_eq!(probe.dimensions(), (64, 48));
    assert_eq!(probe.video.frame_count, 5);
}

#[test]
#[ignore = "needs ffmpeg and ffprobe on PATH"]
fn pipeline_over_real_video() {
    require_ffmpeg();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let clip = write_clip(&dir.path().join("clip.mp4"), 50, 64, 48);

    let mut detector = MockDetector::new().with_pattern(|i| (20..30).contains(&i));
    let result = fishcut_detect::process_video_file(
        &clip,
        &mut detector,
        &PipelineConfig {
            batch_size: 16,
            ..Default::default()
        },
        &PipelineOptions {
            annotate_output: Some(dir.path().join("out.mp4")),
            ..Default::default()
        },
        &CancelToken::new(),
        |_| {},
    )
    .unwrap();

    assert_eq!(result.total_frames, 50);
    assert_eq!(result.batches_processed, 4);
    assert_eq!(result.frames_with_detections, (20..30u64).collect::<Vec<_>>());
    let annotated = result.annotated_output.unwrap();
    assert!(annotated.exists());
    assert_eq!(MediaProbe::probe(&annotated).unwrap().video.frame_count, 50);
}

#[test]
#[ignore = "needs ffmpeg and ffprobe on PATH"]
fn cancelled_run_leaves_no_annotated_file() {
    require_ffmpeg();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = dir.path().join("partial.mp4");
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let source = SyntheticFrameSource::open(500, 25.0, 64, 48).unwrap();
    let mut detector = MockDetector::new();
    let result = process_video(
        source,
        &mut detector,
        &PipelineConfig {
            batch_size: 10,
            ..Default::default()
        },
        &PipelineOptions {
            annotate_output: Some(output.clone()),
            ..Default::default()
        },
        &cancel,
        |e| {
            if let PipelineEvent::BatchCompleted { batch: 1, .. } = e {
                token.cancel();
            }
        },
    )
    .unwrap();

    assert!(result.cancelled);
    assert!(result.annotated_output.is_none());
    assert!(!output.exists());
}

#[test]
#[ignore = "needs ffmpeg and ffprobe on PATH"]
fn worker_writes_annotated_copies() {
    require_ffmpeg();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let out_dir = dir.path().join("annotated");

    let handle = DetectionWorker::spawn_with_opener(
        vec![PathBuf::from("reef.mkv")],
        PipelineConfig {
            batch_size: 8,
            ..Default::default()
        },
        Box::new(MockDetector::new().with_pattern(|i| i % 2 == 0)),
        WorkerOptions {
            annotate_dir: Some(out_dir.clone()),
            annotate: AnnotateConfig::default(),
        },
        Box::new(|_: &Path| -> fishcut_core::Result<Box<dyn FrameSource>> {
            let source = SyntheticFrameSource::open(24, 25.0, 64, 48)?;
            Ok(Box::new(source) as Box<dyn FrameSource>)
        }),
    )
    .unwrap();

    let finished = handle
        .events()
        .iter()
        .filter(|e| matches!(e, WorkerEvent::VideoFinished { .. }))
        .count();
    let reports = handle.join().unwrap();

    assert_eq!(finished, 1);
    let expected = out_dir.join("reef_annotated.mp4");
    assert_eq!(reports[0].annotated_output.as_deref(), Some(expected.as_path()));
    assert!(expected.exists());
}

#[test]
fn missing_video_is_a_source_error() {
    let err = FfmpegFrameSource::open("/nonexistent/clip.mp4")
        .err()
        .expect("missing file must not open");
    assert!(err.is_source_error());
}
