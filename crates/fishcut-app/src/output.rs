//! Plain-text result summaries.

use fishcut_detect::VideoReport;
use std::fmt::Write;

/// One block per video: a header line and the kept ranges as timecodes.
pub fn format_report(report: &VideoReport) -> String {
    let mut out = String::new();
    let status = if report.cancelled { " (cancelled)" } else { "" };
    let _ = writeln!(
        out,
        "{}: {} range(s), {} of {} frames with detections{}",
        report.path.display(),
        report.ranges.len(),
        report.frames_with_detections,
        report.total_frames,
        status
    );
    for ((start, end), range) in report.timecodes.iter().zip(&report.ranges) {
        let _ = writeln!(
            out,
            "  {start} - {end}  (frames {}-{})",
            range.start, range.end
        );
    }
    if let Some(path) = &report.annotated_output {
        let _ = writeln!(out, "  annotated: {}", path.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fishcut_core::FrameRange;
    use std::path::PathBuf;

    #[test]
    fn test_format_report() {
        let report = VideoReport {
            path: PathBuf::from("dive.mp4"),
            fps: 30.0,
            total_frames: 300,
            batches_processed: 10,
            frames_with_detections: 2,
            ranges: vec![FrameRange::new(70, 131)],
            timecodes: vec![("00:00:02.333".into(), "00:00:04.367".into())],
            average_fps: 120.0,
            cancelled: false,
            annotated_output: None,
        };
        let text = format_report(&report);
        assert!(text.starts_with("dive.mp4: 1 range(s), 2 of 300 frames with detections\n"));
        assert!(text.contains("  00:00:02.333 - 00:00:04.367  (frames 70-131)"));
    }
}
