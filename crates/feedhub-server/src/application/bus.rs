//! Bus: bounded, ordered queue carrying [`Message`]s between two stages.
//!
//! Two instances exist at runtime:
//!
//! - the **ingest bus** (acceptor → batch processor), and
//! - the **result bus** (batch processor → results writer).
//!
//! # Backpressure
//!
//! [`BusSender::publish`] waits until the bus has room.  There is no drop
//! policy at this level: when the processor falls behind, connection workers
//! stop reading their sockets, and TCP flow control slows the cameras down.
//!
//! Built on `tokio::sync::mpsc`, so ordering is FIFO per bus and messages from
//! one sender keep their relative order.

use std::time::Duration;

use feedhub_core::Message;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error returned when publishing to a bus whose consumer has gone away.
#[derive(Debug, Error, PartialEq)]
pub enum BusError {
    #[error("{bus} bus is closed")]
    Closed { bus: &'static str },
}

/// Outcome of a time-bounded receive.
#[derive(Debug)]
pub enum Received {
    Message(Message),
    /// Nothing arrived before the deadline.
    TimedOut,
    /// Every sender has been dropped and the bus is drained.
    Closed,
}

/// Creates a bus with room for `capacity` messages.
///
/// `name` only appears in logs and errors.
///
/// # Panics
///
/// Panics if `capacity` is zero (same contract as `tokio::sync::mpsc::channel`).
/// Configuration validation rejects zero capacities before this is reached.
pub fn channel(name: &'static str, capacity: usize) -> (BusSender, BusReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (BusSender { name, tx }, BusReceiver { rx })
}

/// Publishing end of a bus.  Cheap to clone; one per producer.
#[derive(Debug, Clone)]
pub struct BusSender {
    name: &'static str,
    tx: mpsc::Sender<Message>,
}

impl BusSender {
    /// Appends `message`, waiting for free capacity.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the receiving stage has stopped.
    pub async fn publish(&self, message: Message) -> Result<(), BusError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BusError::Closed { bus: self.name })
    }

    /// Number of messages currently queued.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consuming end of a bus.  Exactly one per bus.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::Receiver<Message>,
}

impl BusReceiver {
    /// Waits for the next message; `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Waits at most `timeout` for the next message.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Received {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Received::Message(message),
            Ok(None) => Received::Closed,
            Err(_) => Received::TimedOut,
        }
    }

    /// Number of messages currently queued.
    pub fn depth(&self) -> usize {
        self.rx.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
