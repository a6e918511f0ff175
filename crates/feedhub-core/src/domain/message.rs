//! Messages exchanged between the server's pipeline stages.
//!
//! # Lifecycle of one client
//!
//! ```text
//! ClientConnected ──► Frame, Frame, … ──► ClientDisconnected
//! ```
//!
//! The acceptor emits these three kinds onto the ingest bus.  The batch
//! processor turns runs of `Frame` into `FrameBatch` and forwards the
//! lifecycle events unchanged, so the results writer only ever sees
//! `ClientConnected`, `FrameBatch` and `ClientDisconnected`.

use std::fmt;
use std::net::SocketAddr;

use image::RgbImage;
use uuid::Uuid;

use crate::domain::detection::DetectionResult;

/// Unique identifier assigned to a connection when it is accepted.
pub type ClientId = Uuid;

/// One decoded frame from one client.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    pub client_id: ClientId,
    pub image: RgbImage,
    /// Filled in by the batch processor; `None` until inference has run.
    pub detection: Option<DetectionResult>,
}

impl FrameMessage {
    pub fn new(client_id: ClientId, image: RgbImage) -> Self {
        Self {
            client_id,
            image,
            detection: None,
        }
    }
}

/// Everything that can travel on a bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClientConnected {
        client_id: ClientId,
        address: SocketAddr,
    },
    ClientDisconnected {
        client_id: ClientId,
        address: SocketAddr,
    },
    Frame(FrameMessage),
    /// Frames in the order they were collected; may mix clients.
    FrameBatch(Vec<FrameMessage>),
}

/// Discriminant of a [`Message`], used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ClientConnected,
    ClientDisconnected,
    Frame,
    FrameBatch,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ClientConnected { .. } => MessageKind::ClientConnected,
            Message::ClientDisconnected { .. } => MessageKind::ClientDisconnected,
            Message::Frame(_) => MessageKind::Frame,
            Message::FrameBatch(_) => MessageKind::FrameBatch,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::ClientConnected => "ClientConnected",
            MessageKind::ClientDisconnected => "ClientDisconnected",
            MessageKind::Frame => "Frame",
            MessageKind::FrameBatch => "FrameBatch",
        };
        f.write_str(name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_new_frame_has_no_detection() {
        let frame = FrameMessage::new(Uuid::new_v4(), RgbImage::new(2, 2));
        assert!(frame.detection.is_none());
    }

    #[test]
    fn test_kind_matches_variant() {
        let id = Uuid::new_v4();
        let connected = Message::ClientConnected {
            client_id: id,
            address: addr(),
        };
        assert_eq!(connected.kind(), MessageKind::ClientConnected);
        assert_eq!(Message::FrameBatch(vec![]).kind(), MessageKind::FrameBatch);
    }

    #[test]
    fn test_message_kind_display() {
        assert_eq!(MessageKind::ClientDisconnected.to_string(), "ClientDisconnected");
    }
}
