//! Infrastructure layer for the server.
//!
//! Contains OS-facing adapters: the TCP acceptor, TOML configuration,
//! frame sinks on disk and in the log, process telemetry and the bundled
//! detection model.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `feedhub_core`, but MUST NOT be imported by the `application` layer.

pub mod model;
pub mod network;
pub mod sinks;
pub mod storage;
pub mod telemetry;
