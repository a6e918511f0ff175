//! Per-frame preprocessing applied before a frame is encoded and sent.

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("{stage}: {reason}")]
    Failed { stage: &'static str, reason: String },
}

/// Transforms one frame.
#[cfg_attr(test, mockall::automock)]
pub trait FramePreprocessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns [`PreprocessError`] if the frame cannot be transformed.
    fn process(&self, frame: RgbImage) -> Result<RgbImage, PreprocessError>;
}

/// Applies preprocessors in insertion order.  An empty chain passes frames
/// through untouched.
#[derive(Default)]
pub struct PreprocessorChain {
    stages: Vec<Box<dyn FramePreprocessor>>,
}

impl PreprocessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Box<dyn FramePreprocessor>) {
        self.stages.push(stage);
    }

    pub fn with(mut self, stage: Box<dyn FramePreprocessor>) -> Self {
        self.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names joined with `" -> "`, for logging.
    pub fn describe(&self) -> String {
        if self.stages.is_empty() {
            return "none".to_string();
        }
        self.stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Runs `frame` through every stage, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first stage's [`PreprocessError`].
    pub fn apply(&self, frame: RgbImage) -> Result<RgbImage, PreprocessError> {
        self.stages
            .iter()
            .try_fold(frame, |frame, stage| stage.process(frame))
    }
}

impl std::fmt::Debug for PreprocessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreprocessorChain")
            .field("stages", &self.describe())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
