//! Command line arguments.

use clap::Parser;
use fishcut_core::PipelineConfig;
use fishcut_media::{collect_videos, AnnotateConfig};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fishcut")]
#[command(about = "Find the parts of a video where fish are on screen", version)]
pub struct Cli {
    /// Video files or folders of videos
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// YOLOv8 ONNX model
    #[arg(long, short = 'w')]
    pub weights: Option<PathBuf>,

    /// Class names, one per line
    #[arg(long)]
    pub labels: Option<PathBuf>,

    /// JSON pipeline config; flags below override it
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Decoded batches held ahead of inference
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Minimum detection confidence
    #[arg(long)]
    pub threshold: Option<f32>,

    #[arg(long)]
    pub max_detections: Option<usize>,

    /// Gap in seconds still counted as one range
    #[arg(long)]
    pub frame_buffer_seconds: Option<u32>,

    /// Seconds kept before each range
    #[arg(long)]
    pub buffer_before: Option<f64>,

    /// Seconds kept after each range
    #[arg(long)]
    pub buffer_after: Option<f64>,

    /// Write annotated copies of the videos here
    #[arg(long)]
    pub annotate_dir: Option<PathBuf>,

    /// x264 quality of annotated videos (0-51)
    #[arg(long, default_value_t = 23)]
    pub crf: u32,

    /// Print the results as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied.
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.queue_depth {
            config.max_queued_batches = v;
        }
        if let Some(v) = self.threshold {
            config.prediction_threshold = v;
        }
        if let Some(v) = self.max_detections {
            config.max_detections = v;
        }
        if let Some(v) = self.frame_buffer_seconds {
            config.frame_buffer_seconds = v;
        }
        if let Some(v) = self.buffer_before {
            config.buffer_before = v;
        }
        if let Some(v) = self.buffer_after {
            config.buffer_after = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn annotate_config(&self) -> AnnotateConfig {
        AnnotateConfig {
            crf: self.crf,
            ..Default::default()
        }
    }

    /// Every video named on the command line, folders expanded.
    pub fn videos(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut videos = Vec::new();
        for input in &self.inputs {
            videos.extend(collect_videos(input)?);
        }
        if videos.is_empty() {
            anyhow::bail!("No videos found in the given inputs");
        }
        Ok(videos)
    }
}
