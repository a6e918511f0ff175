//! # feedhub-core
//!
//! Shared library for feedhub containing the wire codec, the JPEG payload
//! codec and the domain messages that travel between pipeline stages.
//!
//! This crate is used by both the server and the camera client.
//! It has zero dependencies on network sockets, async runtimes or files.
//!
//! # Architecture overview
//!
//! feedhub ingests live video from many camera clients.  Each client opens one
//! TCP connection to the server and streams JPEG frames over it.  The server
//! groups frames from all clients into inference batches, runs a detection
//! model, and fans the results back out to one output sink per client.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Every frame is a
//!   4-byte big-endian length prefix followed by that many bytes of JPEG.
//!
//! - **`domain`** – The typed messages exchanged between the server's stages
//!   (`ClientConnected`, `Frame`, `FrameBatch`, `ClientDisconnected`) and the
//!   detection results attached to frames.

pub mod domain;
pub mod protocol;

pub use domain::detection::{BoundingBox, Detection, DetectionResult};
pub use domain::message::{ClientId, FrameMessage, Message, MessageKind};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::image_payload::{decode_jpeg, encode_jpeg};
