//! Domain layer: typed messages and detection results.
//!
//! # Sub-modules
//!
//! - **`message`** – The [`Message`](message::Message) sum type carried on the
//!   server's buses.  Consumers match on it exhaustively, so adding a new kind
//!   is a compile error everywhere it is not handled.
//!
//! - **`detection`** – What a detection model attaches to a frame.

pub mod detection;
pub mod message;
