//! ConnectionAcceptor: accepts camera connections and turns their byte
//! streams into messages on the ingest bus.
//!
//! # One task per connection
//!
//! ```text
//!  accept loop ──► ClientConnected ──► ingest bus
//!       │
//!       └─ spawn ──► connection task: read ─► reassemble ─► decode JPEG ─► Frame
//!                                      └─ EOF / error ─► ClientDisconnected
//! ```
//!
//! Each connection task owns its socket outright.  A bad frame or a reset
//! socket ends that task only; other cameras are unaffected.
//!
//! # Stopping
//!
//! [`ConnectionAcceptor::stop`] closes the listening socket.  Connections that
//! are already open keep streaming until the camera hangs up, a read fails, or
//! the ingest bus is closed by the stages behind it.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use feedhub_core::{decode_frame, decode_jpeg, ClientId, FrameMessage, Message, ProtocolError};
use image::RgbImage;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::application::bus::BusSender;
use crate::application::worker_gauge::WorkerGauge;

/// Bytes requested from the socket per read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Error type for the acceptor.
#[derive(Debug, Error)]
pub enum AcceptorError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    pub listen_addr: SocketAddr,
    /// Largest payload a client may announce before it is disconnected.
    pub max_frame_bytes: usize,
}

/// Reporting view of one open connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedClientInfo {
    pub client_id: ClientId,
    pub address: SocketAddr,
    pub connected_at: SystemTime,
}

/// Shared view of the open connections, for reporting only.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<Mutex<HashMap<ClientId, ConnectedClientInfo>>>,
}

impl ClientRegistry {
    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Open connections, oldest first.
    pub async fn snapshot(&self) -> Vec<ConnectedClientInfo> {
        let mut clients: Vec<_> = self.inner.lock().await.values().cloned().collect();
        clients.sort_by_key(|c| c.connected_at);
        clients
    }

    async fn insert(&self, info: ConnectedClientInfo) {
        self.inner.lock().await.insert(info.client_id, info);
    }

    async fn remove(&self, client_id: &ClientId) {
        self.inner.lock().await.remove(client_id);
    }
}

/// A live connection, owned by its connection task.
struct ConnectedClient {
    client_id: ClientId,
    address: SocketAddr,
    stream: TcpStream,
    connected_at: SystemTime,
}

/// Why a connection task ended.
#[derive(Debug)]
enum SessionEnd {
    PeerClosed,
    Io(io::Error),
    Protocol(ProtocolError),
    BusClosed,
}

/// Handle to the running accept loop.
pub struct ConnectionAcceptor {
    local_addr: SocketAddr,
    registry: ClientRegistry,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ConnectionAcceptor {
    /// Binds the listening socket and spawns the accept loop inside `span`.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptorError::BindFailed`] if the address is unavailable.
    pub async fn start(
        config: AcceptorConfig,
        ingest: BusSender,
        gauge: WorkerGauge,
        span: Span,
    ) -> Result<Self, AcceptorError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| AcceptorError::BindFailed {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AcceptorError::BindFailed {
                addr: config.listen_addr,
                source,
            })?;

        let registry = ClientRegistry::default();
        let cancel = CancellationToken::new();
        let accept_loop = AcceptLoop {
            listener,
            ingest,
            registry: registry.clone(),
            max_frame_bytes: config.max_frame_bytes,
            gauge: gauge.clone(),
            cancel: cancel.clone(),
        };
        let guard = gauge.enter();
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                accept_loop.run().await;
            }
            .instrument(span),
        );

        info!("listening for cameras on {local_addr}");
        Ok(Self {
            local_addr,
            registry,
            cancel,
            handle,
        })
    }

    /// The bound address (useful when the configured port is 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> ClientRegistry {
        self.registry.clone()
    }

    pub async fn connected_count(&self) -> usize {
        self.registry.count().await
    }

    pub async fn connected_clients(&self) -> Vec<ConnectedClientInfo> {
        self.registry.snapshot().await
    }

    /// Stops accepting new connections.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            warn!("called stop on already stopping ConnectionAcceptor");
            return;
        }
        self.cancel.cancel();
    }

    /// Waits up to `timeout` for the accept loop to exit.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("accept loop failed: {e}");
                true
            }
            Err(_) => {
                error!("failed to stop ConnectionAcceptor in reasonable time");
                false
            }
        }
    }
}

struct AcceptLoop {
    listener: TcpListener,
    ingest: BusSender,
    registry: ClientRegistry,
    max_frame_bytes: usize,
    gauge: WorkerGauge,
    cancel: CancellationToken,
}

impl AcceptLoop {
    async fn run(self) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, address)) => {
                    if !self.admit(stream, address).await {
                        break;
                    }
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
        info!("stopped accepting connections");
    }

    /// Registers a new connection, announces it and spawns its task.
    ///
    /// Returns `false` when the loop should end.
    async fn admit(&self, stream: TcpStream, address: SocketAddr) -> bool {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {address}: {e}");
        }

        let client = ConnectedClient {
            client_id: Uuid::new_v4(),
            address,
            stream,
            connected_at: SystemTime::now(),
        };
        info!("camera connected from {address} ({})", client.client_id);

        self.registry
            .insert(ConnectedClientInfo {
                client_id: client.client_id,
                address,
                connected_at: client.connected_at,
            })
            .await;

        let connected = Message::ClientConnected {
            client_id: client.client_id,
            address,
        };
        let published = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            published = self.ingest.publish(connected) => Some(published),
        };
        match published {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.registry.remove(&client.client_id).await;
                error!("{e}; refusing {address}");
                return false;
            }
            None => {
                self.registry.remove(&client.client_id).await;
                return false;
            }
        }

        let ingest = self.ingest.clone();
        let registry = self.registry.clone();
        let max_frame_bytes = self.max_frame_bytes;
        let guard = self.gauge.enter();
        tokio::spawn(
            async move {
                let _guard = guard;
                serve_connection(client, ingest, registry, max_frame_bytes).await;
            }
            .in_current_span(),
        );
        true
    }
}

/// Runs one connection from first byte to `ClientDisconnected`.
async fn serve_connection(
    client: ConnectedClient,
    ingest: BusSender,
    registry: ClientRegistry,
    max_frame_bytes: usize,
) {
    let ConnectedClient {
        client_id,
        address,
        mut stream,
        connected_at,
    } = client;

    let mut frames = 0u64;
    let end = read_frames(&mut stream, client_id, &ingest, max_frame_bytes, &mut frames).await;
    drop(stream);
    registry.remove(&client_id).await;

    let uptime = connected_at.elapsed().unwrap_or_default();
    match &end {
        SessionEnd::PeerClosed => {
            info!("camera {address} disconnected after {frames} frames ({uptime:.1?})")
        }
        SessionEnd::Io(e) => warn!("camera {address} read failed after {frames} frames: {e}"),
        SessionEnd::Protocol(e) => {
            warn!("camera {address} sent an invalid frame after {frames} frames: {e}")
        }
        SessionEnd::BusClosed => {
            warn!("ingest bus closed; dropping camera {address}");
            return;
        }
    }

    let disconnected = Message::ClientDisconnected { client_id, address };
    if let Err(e) = ingest.publish(disconnected).await {
        warn!("{e}; disconnect of {address} not delivered");
    }
}

/// Reads the socket until it closes or misbehaves, publishing each frame.
async fn read_frames(
    stream: &mut TcpStream,
    client_id: ClientId,
    ingest: &BusSender,
    max_frame_bytes: usize,
    frames: &mut u64,
) -> SessionEnd {
    let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        // Drain every complete frame already buffered.
        loop {
            let (payload, consumed) = match decode_frame(&buffer, max_frame_bytes) {
                Ok(Some((payload, consumed))) => (payload.to_vec(), consumed),
                Ok(None) => break,
                Err(e) => return SessionEnd::Protocol(e),
            };
            buffer.drain(..consumed);

            let image = match decode_payload(payload).await {
                Ok(image) => image,
                Err(e) => return SessionEnd::Protocol(e),
            };
            let frame = Message::Frame(FrameMessage::new(client_id, image));
            if ingest.publish(frame).await.is_err() {
                return SessionEnd::BusClosed;
            }
            *frames += 1;
        }

        match stream.read(&mut chunk).await {
            Ok(0) => return SessionEnd::PeerClosed,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => return SessionEnd::Io(e),
        }
    }
}

/// JPEG decoding is CPU-bound, so it runs on the blocking pool.
async fn decode_payload(payload: Vec<u8>) -> Result<RgbImage, ProtocolError> {
    tokio::task::spawn_blocking(move || decode_jpeg(&payload))
        .await
        .map_err(|e| ProtocolError::InvalidImage(format!("decoder task failed: {e}")))?
}

// ── Tests ─────────────────────────────────────────────────────────────────────
