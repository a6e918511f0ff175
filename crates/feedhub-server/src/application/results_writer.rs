//! ResultsWriter: fans processed frames out to one handler per client.
//!
//! # Structure
//!
//! ```text
//!                        ┌──► handler A (queue ─► surface / archive)
//!  result bus ──► dispatch ──► handler B
//!                        └──► handler C
//! ```
//!
//! The **dispatch** task is the only owner of the client map, so the map needs
//! no lock.  Each **handler** is an async task that owns its client's sinks
//! and moves them onto the blocking pool for each synchronous sink call, so
//! a connected but idle client holds no blocking thread.
//!
//! # Backpressure
//!
//! Frames are handed to a handler with `try_send`.  When a client's queue is
//! full the frame is dropped with a warning: a live feed would rather skip a
//! frame than stall every other client behind one slow sink.  Disconnects are
//! rare and are delivered with a waiting `send`.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use feedhub_core::{ClientId, FrameMessage, Message};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::application::bus::BusReceiver;
use crate::application::worker_gauge::WorkerGauge;

// ── Sink contracts ────────────────────────────────────────────────────────────

/// Which sinks a client handler opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultWriterMode {
    ShowFrames,
    SaveFrames,
    ShowAndSaveFrames,
}

impl ResultWriterMode {
    pub fn shows(self) -> bool {
        matches!(self, Self::ShowFrames | Self::ShowAndSaveFrames)
    }

    pub fn saves(self) -> bool {
        matches!(self, Self::SaveFrames | Self::ShowAndSaveFrames)
    }
}

impl Default for ResultWriterMode {
    fn default() -> Self {
        Self::ShowFrames
    }
}

impl fmt::Display for ResultWriterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShowFrames => "show_frames",
            Self::SaveFrames => "save_frames",
            Self::ShowAndSaveFrames => "show_and_save_frames",
        };
        f.write_str(name)
    }
}

impl FromStr for ResultWriterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "show" | "show_frames" => Ok(Self::ShowFrames),
            "save" | "save_frames" => Ok(Self::SaveFrames),
            "show_and_save" | "show_and_save_frames" => Ok(Self::ShowAndSaveFrames),
            other => Err(format!(
                "unknown writer mode '{other}' (expected show_frames, save_frames or show_and_save_frames)"
            )),
        }
    }
}

/// Identifies the sinks opened for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSinkKey {
    pub client_id: ClientId,
    pub address: SocketAddr,
}

/// Error type for sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("sink is closed")]
    Closed,
}

/// Something that displays frames for one client.
pub trait PresentationSurface: Send {
    fn show(&mut self, frame: &FrameMessage) -> Result<(), SinkError>;

    /// Releases the surface.  Called exactly once.
    fn close(&mut self);
}

/// Something that stores frames for one client.
pub trait FrameArchive: Send {
    fn persist(&mut self, frame: &FrameMessage) -> Result<(), SinkError>;

    /// Flushes and releases the archive.  Called exactly once.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Opens per-client sinks.
pub trait SinkFactory: Send + Sync {
    /// One-time setup before any client connects, e.g. creating the save folder.
    fn prepare(&self, _mode: ResultWriterMode) -> Result<(), SinkError> {
        Ok(())
    }

    fn open_surface(&self, key: &ClientSinkKey) -> Result<Box<dyn PresentationSurface>, SinkError>;

    fn open_archive(&self, key: &ClientSinkKey) -> Result<Box<dyn FrameArchive>, SinkError>;
}

// ── Writer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriterConfig {
    pub mode: ResultWriterMode,
    /// Capacity of each client's handler queue.
    pub client_queue_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mode: ResultWriterMode::ShowFrames,
            client_queue_capacity: 100,
        }
    }
}

/// Snapshot of one handler queue, for the health report.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDepth {
    pub client_id: ClientId,
    pub address: SocketAddr,
    pub depth: usize,
    pub capacity: usize,
}

enum Control {
    HandlerDepths(oneshot::Sender<Vec<HandlerDepth>>),
}

/// Asks the dispatch task about its handlers.
#[derive(Clone)]
pub struct WriterProbe {
    control: mpsc::Sender<Control>,
}

impl WriterProbe {
    /// Current queue depth of every live handler.  Empty once stopped.
    pub async fn handler_depths(&self) -> Vec<HandlerDepth> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control
            .send(Control::HandlerDepths(reply_tx))
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

/// Handle to the running dispatch task.
pub struct ResultsWriter {
    cancel: CancellationToken,
    control: mpsc::Sender<Control>,
    handle: JoinHandle<()>,
}

impl ResultsWriter {
    /// Prepares the sinks and spawns the dispatch task inside `span`.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if preparation fails (e.g. the save folder
    /// cannot be created).
    pub fn start(
        results: BusReceiver,
        sinks: Arc<dyn SinkFactory>,
        config: WriterConfig,
        gauge: WorkerGauge,
        span: Span,
    ) -> Result<Self, SinkError> {
        sinks.prepare(config.mode)?;

        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::channel(4);
        let dispatcher = Dispatcher {
            results,
            control: control_rx,
            sinks,
            config,
            gauge: gauge.clone(),
            cancel: cancel.clone(),
            handlers: HashMap::new(),
        };
        let guard = gauge.enter();
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                dispatcher.run().await;
            }
            .instrument(span),
        );

        Ok(Self {
            cancel,
            control: control_tx,
            handle,
        })
    }

    /// A cloneable handle for querying handler depths from another task.
    pub fn probe(&self) -> WriterProbe {
        WriterProbe {
            control: self.control.clone(),
        }
    }

    pub async fn handler_depths(&self) -> Vec<HandlerDepth> {
        self.probe().handler_depths().await
    }

    /// Stops dispatching.  Live handlers see their queues close and exit.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            warn!("called stop on already stopping ResultsWriter");
            return;
        }
        self.cancel.cancel();
    }

    /// Waits up to `timeout` for the dispatch task to exit.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => {
                debug!("ResultsWriter stopped gracefully");
                true
            }
            Ok(Err(e)) => {
                error!("ResultsWriter dispatch failed: {e}");
                true
            }
            Err(_) => {
                error!("failed to stop ResultsWriter in reasonable time");
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

enum HandlerCommand {
    Frame(FrameMessage),
    Disconnect,
}

struct ClientHandler {
    address: SocketAddr,
    tx: mpsc::Sender<HandlerCommand>,
}

struct Dispatcher {
    results: BusReceiver,
    control: mpsc::Receiver<Control>,
    sinks: Arc<dyn SinkFactory>,
    config: WriterConfig,
    gauge: WorkerGauge,
    cancel: CancellationToken,
    handlers: HashMap<ClientId, ClientHandler>,
}

impl Dispatcher {
    async fn run(mut self) {
        info!("results writer started (mode={})", self.config.mode);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(request) = self.control.recv() => self.answer(request),
                message = self.results.recv() => match message {
                    Some(message) => self.dispatch(message).await,
                    None => {
                        info!("result bus closed; results writer exiting");
                        break;
                    }
                },
            }
        }

        if !self.handlers.is_empty() {
            info!("releasing {} client handlers", self.handlers.len());
        }
        self.handlers.clear();
        info!("results writer stopped");
    }

    fn answer(&self, request: Control) {
        match request {
            Control::HandlerDepths(reply) => {
                let depths = self
                    .handlers
                    .iter()
                    .map(|(client_id, handler)| HandlerDepth {
                        client_id: *client_id,
                        address: handler.address,
                        depth: handler.tx.max_capacity() - handler.tx.capacity(),
                        capacity: handler.tx.max_capacity(),
                    })
                    .collect();
                let _ = reply.send(depths);
            }
        }
    }

    async fn dispatch(&mut self, message: Message) {
        match message {
            Message::ClientConnected { client_id, address } => self.register(client_id, address),
            Message::FrameBatch(frames) => self.route(frames),
            Message::ClientDisconnected { client_id, address } => {
                self.unregister(client_id, address).await
            }
            Message::Frame(frame) => self.route(vec![frame]),
        }
    }

    fn register(&mut self, client_id: ClientId, address: SocketAddr) {
        if self.handlers.contains_key(&client_id) {
            error!("client {address} ({client_id}) is already registered; ignoring");
            return;
        }

        let (tx, rx) = mpsc::channel(self.config.client_queue_capacity);
        let key = ClientSinkKey { client_id, address };
        spawn_handler(
            key,
            self.config.mode,
            Arc::clone(&self.sinks),
            rx,
            self.gauge.clone(),
        );
        self.handlers.insert(client_id, ClientHandler { address, tx });
        info!("handler created for {address} ({client_id})");
    }

    fn route(&self, frames: Vec<FrameMessage>) {
        for frame in frames {
            let client_id = frame.client_id;
            let Some(handler) = self.handlers.get(&client_id) else {
                warn!("frame for unknown client {client_id}; skipping");
                continue;
            };
            match handler.tx.try_send(HandlerCommand::Frame(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("queue for {} is full; dropping frame", handler.address)
                }
                Err(TrySendError::Closed(_)) => {
                    error!("handler for {} has exited; dropping frame", handler.address)
                }
            }
        }
    }

    async fn unregister(&mut self, client_id: ClientId, address: SocketAddr) {
        let Some(handler) = self.handlers.remove(&client_id) else {
            warn!("disconnect for unknown client {address} ({client_id})");
            return;
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            sent = handler.tx.send(HandlerCommand::Disconnect) => {
                if sent.is_err() {
                    debug!("handler for {address} already exited");
                }
            }
        }
        info!("handler released for {address} ({client_id})");
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// Why a handler stopped before its client disconnected.
#[derive(Debug, Error)]
enum HandlerError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("sink call panicked")]
    Panicked,

    #[error("sink call aborted: {0}")]
    Aborted(tokio::task::JoinError),
}

impl From<tokio::task::JoinError> for HandlerError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            Self::Panicked
        } else {
            Self::Aborted(e)
        }
    }
}

/// Spawns one client's handler as an async task.
///
/// The handler only borrows a blocking-pool thread for the duration of a
/// single sink call, so idle clients hold no blocking threads.
fn spawn_handler(
    key: ClientSinkKey,
    mode: ResultWriterMode,
    factory: Arc<dyn SinkFactory>,
    rx: mpsc::Receiver<HandlerCommand>,
    gauge: WorkerGauge,
) {
    let guard = gauge.enter();
    tokio::spawn(
        async move {
            let _guard = guard;
            let address = key.address;
            match run_handler(key, mode, factory, rx).await {
                Ok(frames) => debug!("handler for {address} exited after {frames} frames"),
                Err(HandlerError::Panicked) => error!("handler for {address} panicked"),
                Err(e) => error!("handler for {address} failed: {e}"),
            }
        }
        .instrument(Span::current()),
    );
}

/// Handler body.  Returns the number of frames written.
async fn run_handler(
    key: ClientSinkKey,
    mode: ResultWriterMode,
    factory: Arc<dyn SinkFactory>,
    mut rx: mpsc::Receiver<HandlerCommand>,
) -> Result<u64, HandlerError> {
    let mut sinks = ClientSinks::new(key, mode, factory);
    let mut frames = 0u64;

    while let Some(command) = rx.recv().await {
        match command {
            HandlerCommand::Frame(frame) => {
                sinks = on_blocking_pool(sinks, move |sinks| sinks.write(&frame)).await?;
                frames += 1;
            }
            HandlerCommand::Disconnect => break,
        }
    }

    on_blocking_pool(sinks, ClientSinks::close).await?;
    Ok(frames)
}

/// Moves `sinks` onto the blocking pool for one call and hands them back.
///
/// On a sink error the sinks are dropped on the pool thread, which closes
/// them.  On a panic they are dropped during the unwind.
async fn on_blocking_pool<F>(sinks: ClientSinks, call: F) -> Result<ClientSinks, HandlerError>
where
    F: FnOnce(&mut ClientSinks) -> Result<(), SinkError> + Send + 'static,
{
    let span = Span::current();
    let sinks = tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let mut sinks = sinks;
            call(&mut sinks).map(|()| sinks)
        })
    })
    .await??;
    Ok(sinks)
}

/// The sinks owned by one handler, opened on the first frame.
///
/// Closing happens once: explicitly on a clean exit, or from `Drop` when the
/// handler bails out early or unwinds.
struct ClientSinks {
    key: ClientSinkKey,
    mode: ResultWriterMode,
    factory: Arc<dyn SinkFactory>,
    surface: Option<Box<dyn PresentationSurface>>,
    archive: Option<Box<dyn FrameArchive>>,
    opened: bool,
}

impl ClientSinks {
    fn new(key: ClientSinkKey, mode: ResultWriterMode, factory: Arc<dyn SinkFactory>) -> Self {
        Self {
            key,
            mode,
            factory,
            surface: None,
            archive: None,
            opened: false,
        }
    }

    fn open(&mut self) -> Result<(), SinkError> {
        self.opened = true;
        if self.mode.shows() {
            self.surface = Some(self.factory.open_surface(&self.key)?);
        }
        if self.mode.saves() {
            self.archive = Some(self.factory.open_archive(&self.key)?);
        }
        Ok(())
    }

    fn write(&mut self, frame: &FrameMessage) -> Result<(), SinkError> {
        if !self.opened {
            self.open()?;
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.show(frame)?;
        }
        if let Some(archive) = self.archive.as_mut() {
            archive.persist(frame)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut surface) = self.surface.take() {
            surface.close();
        }
        match self.archive.take() {
            Some(mut archive) => archive.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ClientSinks {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to close sinks for {}: {e}", self.key.address);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
