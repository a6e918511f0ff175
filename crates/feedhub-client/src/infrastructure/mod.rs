//! Infrastructure layer for the camera client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `feedhub_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`source`** – Concrete [`VideoSource`](crate::application::video_source::VideoSource)
//!   implementations: a directory of image files and a synthetic test pattern.
//!
//! - **`preprocess`** – Concrete preprocessors: resizing and flipping.
//!
//! - **`network`** – Opens the TCP connection to the server and drives the
//!   send loop over it.

pub mod network;
pub mod preprocess;
pub mod source;
