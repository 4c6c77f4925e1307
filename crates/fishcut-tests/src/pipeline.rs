//! Integration tests for the detection pipeline.
//!
//! Drives synthetic videos through fishcut-detect end to end. No FFmpeg
//! required.

use fishcut_core::{
    detected_frames_to_ranges, CancelToken, FrameRange, FrameSource, PipelineConfig,
    SyntheticFrameSource,
};
use fishcut_detect::{
    process_video, DetectError, DetectionWorker, MockDetector, PipelineEvent, PipelineOptions,
    WorkerEvent, WorkerOptions,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Helpers ────────────────────────────────────────────────────

fn source(frames: u64, fps: f64) -> SyntheticFrameSource {
    SyntheticFrameSource::open(frames, fps, 64, 48).unwrap()
}

fn config(batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        poll_interval_ms: 5,
        ..Default::default()
    }
}

fn run(
    source: SyntheticFrameSource,
    detector: &mut MockDetector,
    config: &PipelineConfig,
) -> (fishcut_detect::VideoDetections, Vec<PipelineEvent>) {
    let mut events = Vec::new();
    let result = process_video(
        source,
        detector,
        config,
        &PipelineOptions::default(),
        &CancelToken::new(),
        |e| events.push(e),
    )
    .unwrap();
    (result, events)
}

// ── Range construction through the pipeline ────────────────────

#[test]
fn expanded_ranges_merge_only_when_buffers_overlap() {
    let config = PipelineConfig {
        buffer_before: 1.0,
        buffer_after: 1.0,
        ..config(32)
    };

    // Padded to (70, 140) and (170, 240): still 30 frames apart.
    let mut detector = MockDetector::new().with_fixed_frames((100..=110).chain(200..=210));
    let (result, _) = run(source(300, 30.0), &mut detector, &config);
    assert_eq!(
        result.ranges,
        vec![FrameRange::new(100, 110), FrameRange::new(200, 210)]
    );
    assert_eq!(
        result.expanded_ranges,
        vec![FrameRange::new(70, 140), FrameRange::new(170, 240)]
    );
    assert_eq!(result.frames_with_detections.len(), 22);

    // Padded to (70, 140) and (120, 190): merged.
    let mut detector = MockDetector::new().with_fixed_frames((100..=110).chain(150..=160));
    let (result, _) = run(source(300, 30.0), &mut detector, &config);
    assert_eq!(result.ranges.len(), 2);
    assert_eq!(result.expanded_ranges, vec![FrameRange::new(70, 190)]);
}

#[test]
fn detections_past_the_reported_length_are_kept() {
    let mut detector = MockDetector::new().with_fixed_frames([110]);
    let config = PipelineConfig {
        buffer_before: 1.0,
        buffer_after: 1.0,
        ..config(32)
    };
    let longer = source(128, 30.0).with_reported_frames(100);

    let (result, events) = run(longer, &mut detector, &config);

    assert!(matches!(
        events[0],
        PipelineEvent::Started {
            total_frames: 100,
            total_batches: 4,
            ..
        }
    ));
    assert_eq!(result.frames_with_detections, vec![110]);
    assert_eq!(result.expanded_ranges, vec![FrameRange::new(80, 127)]);
}

#[test]
fn expansion_is_clamped_to_video() {
    let mut detector = MockDetector::new().with_fixed_frames([2, 95]);
    let config = PipelineConfig {
        buffer_before: 1.0,
        buffer_after: 1.0,
        frame_buffer_seconds: 0,
        ..config(16)
    };

    let (result, _) = run(source(100, 10.0), &mut detector, &config);

    assert_eq!(
        result.expanded_ranges,
        vec![FrameRange::new(0, 12), FrameRange::new(85, 99)]
    );
}

#[test]
fn pipeline_matches_direct_merge() {
    let hit = |i: u64| i % 7 == 0 || (40..60).contains(&i);
    let mut detector = MockDetector::new().with_pattern(hit);
    let config = PipelineConfig {
        frame_buffer_seconds: 0,
        ..config(9)
    };

    let (result, _) = run(source(150, 25.0), &mut detector, &config);

    let expected: Vec<u64> = (0..150).filter(|&i| hit(i)).collect();
    assert_eq!(result.frames_with_detections, expected);
    assert_eq!(result.ranges, detected_frames_to_ranges(&expected, 0));
}

#[test]
fn threshold_filters_weak_detections() {
    let mut detector = MockDetector::new()
        .with_pattern(|_| true)
        .with_confidence(0.3);
    let (result, _) = run(source(40, 30.0), &mut detector, &config(8));
    assert!(result.frames_with_detections.is_empty());
    assert!(result.expanded_ranges.is_empty());
}

// ── Progress and batching ──────────────────────────────────────

#[test]
fn progress_reported_per_batch_and_at_completion() {
    let mut detector = MockDetector::new();
    let (result, events) = run(source(100, 30.0), &mut detector, &config(32));

    assert_eq!(result.total_batches, 4);
    assert_eq!(result.batches_processed, 4);

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert!(percents.len() >= 5);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
    assert!(matches!(events.first(), Some(PipelineEvent::Started { .. })));
}

#[test]
fn detector_sees_every_frame_once_in_order() {
    let mut detector = MockDetector::new();
    let calls = detector.call_log();
    run(source(100, 30.0), &mut detector, &config(32));

    assert_eq!(
        *calls.lock(),
        vec![(0u64, 32usize), (32, 32), (64, 32), (96, 4)]
    );
}

#[test]
fn slow_decoder_still_delivers_every_batch() {
    let slow = source(30, 30.0).with_delay(Duration::from_millis(3));
    let mut detector = MockDetector::new().with_pattern(|_| true);
    let (result, _) = run(slow, &mut detector, &config(4));
    assert_eq!(result.batches_processed, 8);
    assert_eq!(result.frames_with_detections, (0..30u64).collect::<Vec<_>>());
}

// ── Cancellation and failures ──────────────────────────────────

#[test]
fn cancellation_keeps_only_completed_batches() {
    let mut detector = MockDetector::new().with_pattern(|_| true);
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let result = process_video(
        source(10_000, 30.0),
        &mut detector,
        &config(10),
        &PipelineOptions::default(),
        &cancel,
        |e| {
            if let PipelineEvent::BatchCompleted { batch: 4, .. } = e {
                token.cancel();
            }
        },
    )
    .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.batches_processed, 5);
    assert_eq!(result.frames_with_detections, (0..50u64).collect::<Vec<_>>());
    assert_eq!(result.ranges, vec![FrameRange::new(0, 49)]);
}

#[test]
fn detection_failure_names_batch() {
    let mut detector = MockDetector::new().failing_on_batch(3);
    let err = process_video(
        source(100, 30.0),
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
        } => assert_eq!((batch, start_frame, end_frame), (3, 30, 39)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn corrupt_frame_aborts_run() {
    let broken = source(100, 30.0).failing_at(55);
    let mut detector = MockDetector::new();
    let err = process_video(
        broken,
        &mut detector,
        &config(10),
        &PipelineOptions::default(),
        &CancelToken::new(),
        |_| {},
    )
    .unwrap_err();
    assert!(err.is_source_error());
}

// ── Worker ─────────────────────────────────────────────────────

fn synthetic_opener(path: &Path) -> fishcut_core::Result<Box<dyn FrameSource>> {
    let frames = match path.file_stem().and_then(|s| s.to_str()) {
        Some("short") => 20,
        Some("empty") => 0,
        _ => 90,
    };
    Ok(Box::new(SyntheticFrameSource::open(frames, 30.0, 32, 32)?))
}

#[test]
fn worker_reports_each_video() {
    let videos = vec![
        PathBuf::from("long.mp4"),
        PathBuf::from("empty.mp4"),
        PathBuf::from("short.mp4"),
    ];
    let detector = MockDetector::new().with_pattern(|i| (10..15).contains(&i));
    let handle = DetectionWorker::spawn_with_opener(
        videos,
        config(8),
        Box::new(detector),
        WorkerOptions::default(),
        Box::new(synthetic_opener),
    )
    .unwrap();

    let events: Vec<WorkerEvent> = handle.events().iter().collect();
    let reports = handle.join().unwrap();

    let started = events
        .iter()
        .filter(|e| matches!(e, WorkerEvent::VideoStarted { .. }))
        .count();
    assert_eq!(started, 3);
    assert!(events.iter().any(|e| matches!(
        e,
        WorkerEvent::VideoFailed { index: 1, .. }
    )));

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].path, PathBuf::from("long.mp4"));
    assert_eq!(reports[0].ranges, vec![FrameRange::new(10, 14)]);
    assert_eq!(reports[1].total_frames, 20);
    assert_eq!(
        reports[1].timecodes,
        vec![("00:00:00.333".to_string(), "00:00:00.467".to_string())]
    );

    let json = serde_json::to_value(&reports).unwrap();
    assert_eq!(json[0]["ranges"][0]["start"], 10);
}

#[test]
fn worker_rejects_invalid_config() {
    let result = DetectionWorker::spawn_with_opener(
        vec![PathBuf::from("a.mp4")],
        config(0),
        Box::new(MockDetector::new()),
        WorkerOptions::default(),
        Box::new(synthetic_opener),
    );
    assert!(result.is_err());
}
