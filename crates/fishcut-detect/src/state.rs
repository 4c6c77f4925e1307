//! Counters shared between the decode thread and the consumer.

use fishcut_core::CancelToken;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Per-run pipeline state.
///
/// Created when a video starts, updated by the producer (decoded frames,
/// queue depth) and the consumer (processed frames), dropped when the run
/// ends. Holds the run's cancellation flag.
#[derive(Debug, Default)]
pub struct PipelineState {
    total_frames: AtomicU64,
    frames_decoded: AtomicU64,
    frames_processed: AtomicU64,
    queued_batches: AtomicUsize,
    peak_queued_batches: AtomicUsize,
    cancel: CancelToken,
}

impl PipelineState {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_total_frames(&self, total: u64) {
        self.total_frames.store(total, Ordering::Relaxed);
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn add_decoded(&self, frames: u64) {
        self.frames_decoded.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    pub(crate) fn add_processed(&self, frames: u64) {
        self.frames_processed.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Record the current queue length.
    pub(crate) fn set_queued(&self, queued: usize) {
        self.queued_batches.store(queued, Ordering::Relaxed);
        self.peak_queued_batches.fetch_max(queued, Ordering::Relaxed);
    }

    /// Batches decoded but not yet taken by the consumer.
    pub fn queued_batches(&self) -> usize {
        self.queued_batches.load(Ordering::Relaxed)
    }

    /// Highest queue length observed during the run.
    pub fn peak_queued_batches(&self) -> usize {
        self.peak_queued_batches.load(Ordering::Relaxed)
    }
}
