//! Application layer use cases for the camera client.
//!
//! - **`video_source`** – The [`VideoSource`](video_source::VideoSource)
//!   trait: anything that yields frames until it runs dry.
//!
//! - **`preprocessor`** – The [`FramePreprocessor`](preprocessor::FramePreprocessor)
//!   trait and [`PreprocessorChain`](preprocessor::PreprocessorChain), which
//!   applies several preprocessors in order.
//!
//! - **`stream_frames`** – The send loop.  Generic over any `AsyncWrite`, so
//!   it runs against a TCP stream in production and an in-memory pipe in
//!   tests.

pub mod preprocessor;
pub mod stream_frames;
pub mod video_source;
