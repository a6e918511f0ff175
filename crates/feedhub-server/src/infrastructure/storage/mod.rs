//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the server's TOML file, fills every missing
//! field with a default so the server starts without one, and validates the
//! values before any socket is opened.

pub mod config;
