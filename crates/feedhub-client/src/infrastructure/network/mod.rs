//! Network infrastructure for the camera client.
//!
//! [`FrameStreamer`] owns the single TCP connection to the server and runs
//! the send loop over it.  Closing the connection is how the camera tells
//! the server it is done, so the streamer is consumed by [`FrameStreamer::run`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::preprocessor::PreprocessorChain;
use crate::application::stream_frames::{stream_frames, SendError, StreamOptions, StreamSummary};
use crate::application::video_source::VideoSource;

/// A connected camera, ready to stream.
#[derive(Debug)]
pub struct FrameStreamer {
    stream: TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl FrameStreamer {
    /// Connects to the server at `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Connect`] if the connection cannot be opened.
    pub async fn connect(addr: &str) -> Result<Self, SendError> {
        let connect_error = |source| SendError::Connect {
            addr: addr.to_string(),
            source,
        };
        let stream = TcpStream::connect(addr).await.map_err(connect_error)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("could not set TCP_NODELAY: {e}");
        }
        let local_addr = stream.local_addr().map_err(connect_error)?;
        let peer_addr = stream.peer_addr().map_err(connect_error)?;
        info!("connected to {peer_addr} from {local_addr}");

        Ok(Self {
            stream,
            local_addr,
            peer_addr,
        })
    }

    /// The camera's own address, which is how the server names it.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Streams `source` until it runs dry, then closes the connection.
    ///
    /// # Errors
    ///
    /// See [`stream_frames`].
    pub async fn run<S>(
        mut self,
        source: S,
        chain: PreprocessorChain,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<StreamSummary, SendError>
    where
        S: VideoSource + 'static,
    {
        info!(
            "streaming '{}' to {} (preprocessing: {})",
            source.name(),
            self.peer_addr,
            chain.describe()
        );
        stream_frames(&mut self.stream, source, Arc::new(chain), options, cancel).await
    }
}
