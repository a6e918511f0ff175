//! Frame sources.

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("no image files found in {0}")]
    Empty(PathBuf),
}

/// Yields frames one at a time until exhausted.
pub trait VideoSource: Send {
    /// Human-readable name used in log lines.
    fn name(&self) -> &str;

    /// Returns the next frame, or `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the frame cannot be read or decoded.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        (**self).next_frame()
    }
}
