//! Length-prefixed codec for the camera-to-server wire protocol.
//!
//! Wire format (one TCP connection per camera, no handshake):
//! ```text
//! [payload_len:4][payload:N]
//! ```
//! `payload_len` is a big-endian `u32`.  The payload is a single JPEG image.
//!
//! A TCP stream delivers bytes, not messages, so one `read` may return half a
//! frame or several frames at once.  [`decode_frame`] works on an accumulating
//! buffer: it reports `Ok(None)` until a whole frame is present and otherwise
//! returns the payload together with the number of bytes consumed, so the
//! caller can drain its buffer and try again.

use thiserror::Error;

/// Size of the length prefix in bytes.
pub const PROTOCOL_LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload accepted by default (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The length prefix declares a payload larger than the receiver accepts.
    #[error("frame too large: declared {declared} bytes, limit is {limit}")]
    FrameTooLarge { declared: usize, limit: usize },

    /// The payload cannot be represented by a 32-bit length prefix.
    #[error("payload of {0} bytes does not fit a 32-bit length prefix")]
    PayloadTooLarge(usize),

    /// A frame with a zero-length payload was received.
    #[error("empty frame payload")]
    EmptyPayload,

    /// The payload is not a decodable image.
    #[error("invalid image payload: {0}")]
    InvalidImage(String),

    /// An image could not be encoded for transmission.
    #[error("image encoding failed: {0}")]
    EncodeFailed(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Wraps `payload` in a length-prefixed frame.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload length does not
/// fit in a `u32`.
///
/// # Examples
///
/// ```rust
/// use feedhub_core::protocol::{decode_frame, encode_frame, DEFAULT_MAX_FRAME_BYTES};
///
/// let bytes = encode_frame(b"jpeg").unwrap();
/// let (payload, consumed) = decode_frame(&bytes, DEFAULT_MAX_FRAME_BYTES).unwrap().unwrap();
/// assert_eq!(payload, b"jpeg");
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(PROTOCOL_LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the beginning of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame.  On
/// success returns the payload slice and the total number of bytes consumed
/// (prefix + payload).
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] as soon as the prefix is readable
/// and declares more than `max_len` bytes, without waiting for the payload.
pub fn decode_frame(buf: &[u8], max_len: usize) -> Result<Option<(&[u8], usize)>, ProtocolError> {
    let Some(declared) = peek_length(buf) else {
        return Ok(None);
    };

    if declared > max_len {
        return Err(ProtocolError::FrameTooLarge {
            declared,
            limit: max_len,
        });
    }

    let total = PROTOCOL_LENGTH_PREFIX_SIZE + declared;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some((&buf[PROTOCOL_LENGTH_PREFIX_SIZE..total], total)))
}

/// Reads the declared payload length, if the prefix is complete.
pub fn peek_length(buf: &[u8]) -> Option<usize> {
    let prefix: [u8; PROTOCOL_LENGTH_PREFIX_SIZE] =
        buf.get(..PROTOCOL_LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
