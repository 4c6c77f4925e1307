//! Fishcut - find the fish in hours of footage
//!
//! Entry point: parses the command line, runs the detection worker over the
//! inputs and prints the ranges worth keeping.

mod cli;
mod output;
mod signal;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use fishcut_core::PipelineConfig;
use fishcut_detect::{Detector, DetectionWorker, PipelineEvent, WorkerEvent, WorkerOptions};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays clean.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(outcome) => ExitCode::from(outcome.code()),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    /// At least one video failed.
    Failed,
    /// Stopped by Ctrl-C; reports cover what finished.
    Interrupted,
}

impl Outcome {
    fn code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::Interrupted => signal::EXIT_INTERRUPTED,
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let config = cli.pipeline_config()?;
    let videos = cli.videos()?;

    if !fishcut_media::init() {
        anyhow::bail!("ffmpeg and ffprobe must be installed and on PATH");
    }
    let detector = load_detector(cli, &config)?;
    info!(
        videos = videos.len(),
        classes = detector.class_names().len(),
        batch_size = config.batch_size,
        "Fishcut starting"
    );

    let total = videos.len();
    let handle = DetectionWorker::spawn(
        videos,
        config,
        detector,
        WorkerOptions {
            annotate_dir: cli.annotate_dir.clone(),
            annotate: cli.annotate_config(),
        },
    )?;
    signal::cancel_on_interrupt(handle.cancel_token())?;

    let mut failed = 0;
    let mut interrupted = false;
    for event in handle.events().iter() {
        match event {
            WorkerEvent::VideoStarted { index, path } => {
                info!(video = index + 1, total, path = %path.display(), "Processing");
            }
            WorkerEvent::Video {
                event: PipelineEvent::Progress(percent),
                ..
            } => debug!(percent, "Progress"),
            WorkerEvent::Video { .. } => {}
            WorkerEvent::VideoFinished { report, .. } => {
                if !cli.json {
                    print!("{}", output::format_report(&report));
                }
            }
            WorkerEvent::VideoFailed { path, error, .. } => {
                error!(path = %path.display(), "{}", error);
            }
            WorkerEvent::Finished {
                processed,
                failed: failures,
                cancelled,
            } => {
                failed = failures;
                interrupted = cancelled;
                if cancelled {
                    warn!("Run cancelled");
                }
                info!(processed, failed, "Done");
            }
        }
    }

    let reports = handle.join()?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(if interrupted {
        Outcome::Interrupted
    } else if failed > 0 {
        Outcome::Failed
    } else {
        Outcome::Success
    })
}

#[cfg(feature = "onnx")]
fn load_detector(cli: &Cli, config: &PipelineConfig) -> Result<Box<dyn Detector>> {
    use anyhow::Context;
    use fishcut_detect::{load_class_names, OnnxDetector};

    let weights = cli
        .weights
        .as_deref()
        .context("--weights is required to run detection")?;
    let class_names = match &cli.labels {
        Some(path) => load_class_names(path)?,
        None => Vec::new(),
    };
    Ok(Box::new(OnnxDetector::load(weights, class_names, config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_detector(_cli: &Cli, _config: &PipelineConfig) -> Result<Box<dyn Detector>> {
    anyhow::bail!("No detector backend compiled in; rebuild fishcut with `--features onnx`")
}
