//! BatchProcessor: drains the ingest bus into bounded inference batches.
//!
//! # Batch window (for beginners)
//!
//! A detection model is much cheaper per image when it is fed many images at
//! once, but a live feed cannot wait forever for a batch to fill up.  The
//! processor therefore collects frames until **either** the batch is full
//! **or** the time window runs out, whichever happens first:
//!
//! ```text
//! window = 100 ms, batch_size = 4
//!
//!  t=0      t=20     t=35     t=50                       t=100
//!  │ frame  │ frame  │ frame  │ frame ──► full, emit now   │
//!  │ frame  │                                  (nothing) ──► timeout, emit 1
//! ```
//!
//! Lifecycle events are handled on the way through:
//!
//! - `ClientConnected` is forwarded to the result bus at once and does not
//!   take a batch slot.
//! - `ClientDisconnected` ends collection immediately.  The frames collected
//!   so far are published first and the disconnect right after them, so the
//!   results writer never sees a client's frames after its disconnect.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use feedhub_core::{ClientId, DetectionResult, FrameMessage, Message};
use image::RgbImage;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::application::bus::{BusReceiver, BusSender, Received};
use crate::application::worker_gauge::WorkerGauge;

/// Error type for detection model invocations.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("model returned {actual} results for {expected} images")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("model panicked during inference")]
    Panicked,
}

/// Pluggable detection capability.
///
/// Given an ordered list of images, returns one result per image in the same
/// order.  Called from the blocking thread pool, so implementations may take
/// as long as they need.
#[cfg_attr(test, mockall::automock)]
pub trait DetectionModel: Send + Sync {
    /// Short name used in startup logs.
    fn name(&self) -> &'static str;

    fn detect(&self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, ModelError>;
}

/// Size/time policy for batch collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchConfig {
    /// Maximum number of frames per batch.
    pub batch_size: usize,
    /// Longest time to wait for a batch to fill.
    pub time_window: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            time_window: Duration::from_millis(100),
        }
    }
}

/// What one call to `collect_batch` gathered.
#[derive(Debug, Default)]
struct CollectedBatch {
    frames: Vec<FrameMessage>,
    /// A `ClientDisconnected` that ended collection; publish after `frames`.
    disconnect: Option<Message>,
    /// The ingest bus closed or the result bus went away.
    upstream_closed: bool,
    cancelled: bool,
}

/// Handle to the running batch processor worker.
pub struct BatchProcessor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BatchProcessor {
    /// Spawns the processor worker inside `span`.
    pub fn start(
        ingest: BusReceiver,
        results: BusSender,
        model: Arc<dyn DetectionModel>,
        config: BatchConfig,
        gauge: WorkerGauge,
        span: Span,
    ) -> Self {
        let cancel = CancellationToken::new();
        let worker = Worker {
            ingest,
            results,
            model,
            config,
            cancel: cancel.clone(),
        };
        let guard = gauge.enter();
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                worker.run().await;
            }
            .instrument(span),
        );
        Self { cancel, handle }
    }

    /// Asks the worker to stop at its next wait point.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            warn!("called stop on already stopping BatchProcessor");
            return;
        }
        self.cancel.cancel();
    }

    /// Waits up to `timeout` for the worker to exit.
    ///
    /// Returns `false`, after logging an error, if it is still running.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => {
                debug!("BatchProcessor stopped gracefully");
                true
            }
            Ok(Err(e)) => {
                error!("BatchProcessor worker failed: {e}");
                true
            }
            Err(_) => {
                error!("failed to stop BatchProcessor in reasonable time");
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct Worker {
    ingest: BusReceiver,
    results: BusSender,
    model: Arc<dyn DetectionModel>,
    config: BatchConfig,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        info!(
            "processor started (batch_size={}, window={:?})",
            self.config.batch_size, self.config.time_window
        );

        while !self.cancel.is_cancelled() {
            let collected = self.collect_batch().await;

            if !collected.frames.is_empty() {
                let count = collected.frames.len();
                let batch = self.infer(collected.frames).await;
                if !self.forward(Message::FrameBatch(batch)).await {
                    break;
                }
                debug!("published batch of {count} frames");
            }

            if let Some(disconnect) = collected.disconnect {
                if !self.forward(disconnect).await {
                    break;
                }
            }

            if collected.upstream_closed {
                info!("bus closed; processor exiting");
                break;
            }
            if collected.cancelled {
                break;
            }
        }

        info!("processor stopped");
    }

    /// Collects frames until the batch is full, the window elapses, a client
    /// disconnects, or the worker is cancelled.
    async fn collect_batch(&mut self) -> CollectedBatch {
        let mut batch = CollectedBatch::default();
        let deadline = Instant::now() + self.config.time_window;

        loop {
            if batch.frames.len() >= self.config.batch_size {
                return batch;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return batch;
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    batch.cancelled = true;
                    return batch;
                }
                received = self.ingest.recv_timeout(remaining) => received,
            };

            match received {
                Received::TimedOut => return batch,
                Received::Closed => {
                    batch.upstream_closed = true;
                    return batch;
                }
                Received::Message(Message::Frame(frame)) => batch.frames.push(frame),
                Received::Message(connected @ Message::ClientConnected { .. }) => {
                    if !self.forward(connected).await {
                        batch.upstream_closed = true;
                        return batch;
                    }
                }
                Received::Message(disconnected @ Message::ClientDisconnected { .. }) => {
                    batch.disconnect = Some(disconnected);
                    return batch;
                }
                Received::Message(Message::FrameBatch(frames)) => {
                    warn!(
                        "dropping unexpected batch of {} frames on the ingest bus",
                        frames.len()
                    );
                }
            }
        }
    }

    /// Runs the model and attaches one result to each frame.
    ///
    /// On model failure the frames are passed on without detections.
    async fn infer(&self, frames: Vec<FrameMessage>) -> Vec<FrameMessage> {
        let model = Arc::clone(&self.model);
        let (ids, images): (Vec<ClientId>, Vec<RgbImage>) = frames
            .into_iter()
            .map(|frame| (frame.client_id, frame.image))
            .unzip();

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| model.detect(&images)))
                .unwrap_or(Err(ModelError::Panicked));
            (images, outcome)
        })
        .await;

        let (images, outcome) = match joined {
            Ok(parts) => parts,
            Err(e) => {
                // Only reachable if the runtime is shutting down.
                error!("inference task aborted, dropping {} frames: {e}", ids.len());
                return Vec::new();
            }
        };

        let expected = images.len();
        let results: Vec<Option<DetectionResult>> = match outcome {
            Ok(results) if results.len() == expected => results.into_iter().map(Some).collect(),
            Ok(results) => {
                error!(
                    "{}",
                    ModelError::LengthMismatch {
                        expected,
                        actual: results.len()
                    }
                );
                vec![None; expected]
            }
            Err(e) => {
                error!("forwarding {expected} frames without detections: {e}");
                vec![None; expected]
            }
        };

        ids.into_iter()
            .zip(images)
            .zip(results)
            .map(|((client_id, image), detection)| FrameMessage {
                client_id,
                image,
                detection,
            })
            .collect()
    }

    /// Publishes to the result bus, giving up if cancelled or closed.
    async fn forward(&self, message: Message) -> bool {
        let kind = message.kind();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("cancelled while publishing {kind}; message dropped");
                false
            }
            published = self.results.publish(message) => match published {
                Ok(()) => true,
                Err(e) => {
                    warn!("{e}; dropping {kind}");
                    false
                }
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
