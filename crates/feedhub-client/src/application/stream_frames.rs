//! The camera send loop.
//!
//! ```text
//!  VideoSource ──▶ PreprocessorChain ──▶ encode_jpeg ──▶ encode_frame ──▶ writer
//!  (blocking pool: read, transform, encode)              (async write_all)
//! ```
//!
//! Reading, preprocessing and encoding run on tokio's blocking pool; only the
//! socket write happens on the async side.  The loop ends when the source is
//! exhausted, the frame limit is reached, the token is cancelled or any step
//! fails.  A preprocessing failure aborts the loop rather than skipping the
//! frame.

use std::sync::Arc;
use std::time::Duration;

use feedhub_core::protocol::DEFAULT_JPEG_QUALITY;
use feedhub_core::{encode_frame, encode_jpeg, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::preprocessor::{PreprocessError, PreprocessorChain};
use crate::application::video_source::{SourceError, VideoSource};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame source failed: {0}")]
    Source(#[from] SourceError),
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("could not encode frame: {0}")]
    Encode(#[from] ProtocolError),
    #[error("frame preparation task panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamOptions {
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
    /// Target frames per second.  `None` sends as fast as frames are ready.
    pub fps: Option<f64>,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fps: None,
            max_frames: None,
        }
    }
}

/// Why the send loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    SourceExhausted,
    FrameLimit,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames_sent: u64,
    /// Bytes written, length prefixes included.
    pub bytes_sent: u64,
    pub ended: StreamEnd,
}

/// Streams every frame of `source` to `writer`, then shuts the writer down.
///
/// # Errors
///
/// Returns [`SendError`] on the first source, preprocessing, encoding or I/O
/// failure.  Frames written before the failure stay written.
pub async fn stream_frames<W, S>(
    writer: &mut W,
    source: S,
    chain: Arc<PreprocessorChain>,
    options: StreamOptions,
    cancel: CancellationToken,
) -> Result<StreamSummary, SendError>
where
    W: AsyncWrite + Unpin,
    S: VideoSource + 'static,
{
    let mut pacer = options
        .fps
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .map(|fps| {
            let mut ticker = time::interval(Duration::from_secs_f64(1.0 / fps));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

    let mut source = Some(source);
    let mut frames_sent = 0u64;
    let mut bytes_sent = 0u64;

    let ended = loop {
        if options.max_frames.is_some_and(|max| frames_sent >= max) {
            break StreamEnd::FrameLimit;
        }

        if let Some(ticker) = pacer.as_mut() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break StreamEnd::Cancelled,
                _ = ticker.tick() => {}
            }
        }

        let Some(current) = source.take() else {
            break StreamEnd::SourceExhausted;
        };
        let chain = Arc::clone(&chain);
        let quality = options.jpeg_quality;
        let prepared = tokio::task::spawn_blocking(move || {
            let mut current = current;
            let frame = prepare_next(&mut current, &chain, quality);
            (current, frame)
        });

        let (returned, frame) = tokio::select! {
            biased;
            () = cancel.cancelled() => break StreamEnd::Cancelled,
            joined = prepared => joined.map_err(|_| SendError::Panicked)?,
        };
        source = Some(returned);

        let Some(bytes) = frame? else {
            break StreamEnd::SourceExhausted;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break StreamEnd::Cancelled,
            written = writer.write_all(&bytes) => written?,
        }
        frames_sent += 1;
        bytes_sent += bytes.len() as u64;
        debug!(frame = frames_sent, bytes = bytes.len(), "frame sent");
    };

    writer.flush().await?;
    writer.shutdown().await?;

    info!(frames_sent, bytes_sent, ?ended, "stream finished");
    Ok(StreamSummary {
        frames_sent,
        bytes_sent,
        ended,
    })
}

/// Reads, transforms and encodes one frame into wire bytes.
fn prepare_next<S: VideoSource>(
    source: &mut S,
    chain: &PreprocessorChain,
    quality: u8,
) -> Result<Option<Vec<u8>>, SendError> {
    let Some(frame) = source.next_frame()? else {
        return Ok(None);
    };
    let frame = chain.apply(frame)?;
    let jpeg = encode_jpeg(&frame, quality)?;
    Ok(Some(encode_frame(&jpeg)?))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
