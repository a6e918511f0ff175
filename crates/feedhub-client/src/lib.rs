//! feedhub-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does feedhub-client do?
//!
//! The client is one camera.  It:
//!
//! 1. Opens a single TCP connection to the feedhub server.
//! 2. Pulls frames from a [`VideoSource`](application::video_source::VideoSource)
//!    (a directory of images or a synthetic test pattern).
//! 3. Runs every frame through a chain of preprocessors (resize, flip).
//! 4. Encodes the result as JPEG and writes it to the socket behind a 4-byte
//!    big-endian length prefix.
//!
//! The server learns about the camera when the connection opens and forgets
//! it when the connection closes; there is no handshake.

/// Application layer: frame sources, preprocessing and the send loop.
pub mod application;

/// Infrastructure layer: concrete sources, preprocessors and the TCP link.
pub mod infrastructure;
