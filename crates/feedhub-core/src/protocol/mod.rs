//! Protocol module containing the length-prefixed frame codec and the JPEG
//! payload codec.

pub mod codec;
pub mod image_payload;

pub use codec::{
    decode_frame, encode_frame, ProtocolError, DEFAULT_MAX_FRAME_BYTES,
    PROTOCOL_LENGTH_PREFIX_SIZE,
};
pub use image_payload::{decode_jpeg, encode_jpeg, DEFAULT_JPEG_QUALITY};
