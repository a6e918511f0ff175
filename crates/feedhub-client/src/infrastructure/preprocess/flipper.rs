//! Frame mirroring.

use std::fmt;
use std::str::FromStr;

use image::imageops;
use image::RgbImage;

use crate::application::preprocessor::{FramePreprocessor, PreprocessError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlipDirection {
    /// Mirror left to right, the usual webcam "selfie" correction.
    #[default]
    Horizontal,
    /// Turn upside down.
    Vertical,
}

impl fmt::Display for FlipDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => f.write_str("horizontal"),
            Self::Vertical => f.write_str("vertical"),
        }
    }
}

impl FromStr for FlipDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "horizontal" | "h" => Ok(Self::Horizontal),
            "vertical" | "v" => Ok(Self::Vertical),
            other => Err(format!(
                "unknown flip direction '{other}' (expected horizontal or vertical)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Flipper {
    direction: FlipDirection,
}

impl Flipper {
    pub fn new(direction: FlipDirection) -> Self {
        Self { direction }
    }
}

impl FramePreprocessor for Flipper {
    fn name(&self) -> &'static str {
        "flip"
    }

    fn process(&self, mut frame: RgbImage) -> Result<RgbImage, PreprocessError> {
        match self.direction {
            FlipDirection::Horizontal => imageops::flip_horizontal_in_place(&mut frame),
            FlipDirection::Vertical => imageops::flip_vertical_in_place(&mut frame),
        }
        Ok(frame)
    }
}
