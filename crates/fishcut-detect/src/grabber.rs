//! Background frame decoding and batching.
//!
//! A dedicated thread pulls frames from a [`FrameSource`], groups them into
//! batches, preprocesses them and pushes them into a bounded channel. The
//! consumer pulls batches with a timeout so it can service cancellation and
//! progress between polls. When the channel is full the decode thread
//! blocks, which caps memory at `max_queued_batches` batches.

use crate::error::{DetectError, DetectResult};
use crate::preprocess::{Batch, BatchPreprocessor};
use crate::state::PipelineState;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use fishcut_core::{FishcutError, Frame, FrameSource, PipelineConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Grabber settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabberConfig {
    pub batch_size: usize,
    pub max_queued_batches: usize,
    /// Model input size `(width, height)`.
    pub input_size: (u32, u32),
    /// How long [`ThreadedFrameGrabber::next_batch`] waits before reporting
    /// [`BatchPoll::Pending`].
    pub poll_interval: Duration,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for GrabberConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_queued_batches: config.max_queued_batches,
            input_size: config.input_size,
            poll_interval: config.poll_interval(),
        }
    }
}

/// Outcome of one poll of the batch queue.
#[derive(Debug)]
pub enum BatchPoll {
    /// The next batch in video order.
    Ready(Batch),
    /// The decoder has not produced the next batch yet; poll again.
    Pending,
    /// No more batches: end of video, batch limit reached, or cancelled.
    Finished,
}

enum Message {
    Batch(Batch),
    Failed(DetectError),
}

/// Runs a [`FrameSource`] on its own thread and hands out batches in order.
///
/// Not restartable: once finished, construct a new grabber to read again.
/// Dropping the grabber stops the decode thread and closes the source on
/// every exit path.
pub struct ThreadedFrameGrabber {
    receiver: Option<Receiver<Message>>,
    producer: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    state: Arc<PipelineState>,
    poll_interval: Duration,
    total_frames: u64,
    total_batches: usize,
    fps: f64,
    dimensions: (u32, u32),
    batches_delivered: usize,
    finished: bool,
}

impl ThreadedFrameGrabber {
    /// Start decoding `source` on a background thread.
    pub fn open<S>(
        mut source: S,
        config: GrabberConfig,
        state: Arc<PipelineState>,
    ) -> DetectResult<Self>
    where
        S: FrameSource + 'static,
    {
        if config.batch_size == 0 || config.max_queued_batches == 0 {
            source.close();
            return Err(FishcutError::InvalidParameter(format!(
                "batch_size and max_queued_batches must be > 0, got {} and {}",
                config.batch_size, config.max_queued_batches
            ))
            .into());
        }

        let total_frames = source.total_frames();
        let total_batches = total_frames.div_ceil(config.batch_size as u64) as usize;
        let fps = source.fps();
        let dimensions = source.dimensions();
        state.set_total_frames(total_frames);

        let (sender, receiver) = bounded(config.max_queued_batches);
        let stop = Arc::new(AtomicBool::new(false));

        let producer = Producer {
            sender,
            stop: Arc::clone(&stop),
            state: Arc::clone(&state),
            preprocessor: BatchPreprocessor::new(config.input_size),
            batch_size: config.batch_size,
            total_batches,
            poll_interval: config.poll_interval,
        };
        let handle = std::thread::Builder::new()
            .name("fishcut-grabber".into())
            .spawn(move || producer.run(source))
            .map_err(|e| FishcutError::Internal(format!("Failed to spawn grabber thread: {e}")))?;

        debug!(
            total_frames,
            total_batches,
            batch_size = config.batch_size,
            queue = config.max_queued_batches,
            "Frame grabber started"
        );

        Ok(Self {
            receiver: Some(receiver),
            producer: Some(handle),
            stop,
            state,
            poll_interval: config.poll_interval,
            total_frames,
            total_batches,
            fps,
            dimensions,
            batches_delivered: 0,
            finished: false,
        })
    }

    /// `ceil(total_frames / batch_size)`, fixed at open time.
    pub fn total_batch_count(&self) -> usize {
        self.total_batches
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn batches_delivered(&self) -> usize {
        self.batches_delivered
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    /// Wait up to the poll interval for the next batch.
    ///
    /// Returns [`BatchPoll::Pending`] on timeout. Once cancellation is
    /// observed no further batches are handed out and queued ones are
    /// discarded. A decode or preprocessing failure is returned once, after
    /// which the grabber reports [`BatchPoll::Finished`].
    pub fn next_batch(&mut self) -> DetectResult<BatchPoll> {
        if self.finished {
            return Ok(BatchPoll::Finished);
        }
        if self.state.is_cancelled() {
            debug!(delivered = self.batches_delivered, "Cancelled, discarding queued batches");
            self.shutdown()?;
            return Ok(BatchPoll::Finished);
        }
        let Some(receiver) = self.receiver.as_ref() else {
            return Ok(BatchPoll::Finished);
        };

        match receiver.recv_timeout(self.poll_interval) {
            Ok(Message::Batch(batch)) => {
                self.state.set_queued(receiver.len());
                self.batches_delivered += 1;
                Ok(BatchPoll::Ready(batch))
            }
            Ok(Message::Failed(err)) => {
                self.shutdown()?;
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                // Decoder is behind the model; the caller polls again.
                debug!("No batch available, waiting...");
                Ok(BatchPoll::Pending)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.shutdown()?;
                Ok(BatchPoll::Finished)
            }
        }
    }

    /// Iterate over batches; `Ok(None)` is the "no batch yet" sentinel.
    pub fn batches(&mut self) -> Batches<'_> {
        Batches { grabber: self }
    }

    /// Stop the decode thread and wait for it to release the source.
    fn shutdown(&mut self) -> DetectResult<()> {
        self.finished = true;
        self.stop.store(true, Ordering::Release);
        // Dropping the receiver unblocks a producer waiting on a full queue.
        self.receiver = None;
        self.state.set_queued(0);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                error!("Frame grabber thread panicked");
                return Err(DetectError::WorkerPanicked);
            }
        }
        Ok(())
    }
}

impl Drop for ThreadedFrameGrabber {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Iterator returned by [`ThreadedFrameGrabber::batches`].
pub struct Batches<'a> {
    grabber: &'a mut ThreadedFrameGrabber,
}

impl Iterator for Batches<'_> {
    type Item = DetectResult<Option<Batch>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.grabber.next_batch() {
            Ok(BatchPoll::Ready(batch)) => Some(Ok(Some(batch))),
            Ok(BatchPoll::Pending) => Some(Ok(None)),
            Ok(BatchPoll::Finished) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// State moved onto the decode thread.
struct Producer {
    sender: Sender<Message>,
    stop: Arc<AtomicBool>,
    state: Arc<PipelineState>,
    preprocessor: BatchPreprocessor,
    batch_size: usize,
    total_batches: usize,
    poll_interval: Duration,
}

impl Producer {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.state.is_cancelled()
    }

    fn run<S: FrameSource>(self, mut source: S) {
        let mut batch_index = 0;
        while batch_index < self.total_batches {
            let frames = match self.read_batch(&mut source) {
                Ok(Some(frames)) => frames,
                Ok(None) => break,
                Err(err) => {
                    warn!(batch = batch_index, "Frame decoding failed: {}", err);
                    self.send(Message::Failed(err));
                    break;
                }
            };
            let end_of_stream = frames.len() < self.batch_size;

            let batch = match self.preprocessor.make_batch(batch_index, frames) {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(batch = batch_index, "Preprocessing failed: {}", err);
                    self.send(Message::Failed(err));
                    break;
                }
            };
            if !self.send(Message::Batch(batch)) {
                break;
            }
            batch_index += 1;
            if end_of_stream {
                break;
            }
        }
        source.close();
        debug!(batches = batch_index, "Frame grabber finished");
    }

    /// Decode up to `batch_size` frames. `Ok(None)` means nothing to send:
    /// the stream ended or a stop was requested mid-batch.
    fn read_batch<S: FrameSource>(&self, source: &mut S) -> DetectResult<Option<Vec<Frame>>> {
        let mut frames = Vec::with_capacity(self.batch_size);
        while frames.len() < self.batch_size {
            if self.should_stop() {
                // A partial batch is never handed out as complete.
                return Ok(None);
            }
            match source.next_frame()? {
                Some(frame) => {
                    self.state.add_decoded(1);
                    frames.push(frame);
                }
                None => break,
            }
        }
        Ok((!frames.is_empty()).then_some(frames))
    }

    /// Block until the message is queued. Returns false if the consumer went
    /// away or a stop was requested while waiting.
    fn send(&self, mut message: Message) -> bool {
        loop {
            match self.sender.send_timeout(message, self.poll_interval) {
                Ok(()) => {
                    self.state.set_queued(self.sender.len());
                    return true;
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.should_stop() {
                        return false;
                    }
                    message = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}
