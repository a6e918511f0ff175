//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`connection_acceptor`** – Listens for camera connections, reassembles
//!   length-prefixed JPEG frames from each socket and publishes lifecycle and
//!   frame messages onto the ingest bus.

pub mod connection_acceptor;
