//! JPEG payload codec.
//!
//! The payload of every frame is the raw bytes of one JPEG-encoded image.
//! There is no envelope around it: the length prefix from
//! [`crate::protocol::codec`] is the only framing.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::protocol::codec::ProtocolError;

/// JPEG quality used by the camera client unless configured otherwise.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Encodes `image` as JPEG at the given quality (1–100).
///
/// # Errors
///
/// Returns [`ProtocolError::EncodeFailed`] if the encoder rejects the image
/// (for example a zero-sized image).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .map_err(|e| ProtocolError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

/// Decodes a JPEG payload into an 8-bit RGB image.
///
/// # Errors
///
/// Returns [`ProtocolError::EmptyPayload`] for an empty slice and
/// [`ProtocolError::InvalidImage`] for anything that is not a decodable JPEG.
pub fn decode_jpeg(payload: &[u8]) -> Result<RgbImage, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    let decoded = image::load_from_memory_with_format(payload, ImageFormat::Jpeg)
        .map_err(|e| ProtocolError::InvalidImage(e.to_string()))?;
    Ok(decoded.to_rgb8())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
