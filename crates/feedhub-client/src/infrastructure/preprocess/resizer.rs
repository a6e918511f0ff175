//! Frame resizing.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::application::preprocessor::{FramePreprocessor, PreprocessError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSize {
    /// Scale to this width, keeping the aspect ratio.
    Width(u32),
    /// Scale to exactly `width` × `height`.
    Exact { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Resizer {
    target: TargetSize,
    filter: FilterType,
}

impl Resizer {
    pub fn new(target: TargetSize) -> Self {
        Self {
            target,
            filter: FilterType::Triangle,
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Output dimensions for an input of `width` × `height`.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.target {
            TargetSize::Width(target) => {
                let scaled = u64::from(height) * u64::from(target) / u64::from(width.max(1));
                (target, scaled.clamp(1, u64::from(u32::MAX)) as u32)
            }
            TargetSize::Exact { width, height } => (width, height),
        }
    }
}

impl FramePreprocessor for Resizer {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn process(&self, frame: RgbImage) -> Result<RgbImage, PreprocessError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(PreprocessError::Failed {
                stage: self.name(),
                reason: "empty frame".to_string(),
            });
        }
        let (width, height) = self.output_size(frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(PreprocessError::Failed {
                stage: self.name(),
                reason: format!("target size {width}x{height} is empty"),
            });
        }
        if (width, height) == frame.dimensions() {
            return Ok(frame);
        }
        Ok(imageops::resize(&frame, width, height, self.filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_target_keeps_aspect_ratio() {
        // Arrange
        let resizer = Resizer::new(TargetSize::Width(320));

        // Act
        let out = resizer.process(RgbImage::new(640, 480)).unwrap();

        // Assert
        assert_eq!(out.dimensions(), (320, 240));
    }

    #[test]
    fn test_width_target_truncates_height() {
        let resizer = Resizer::new(TargetSize::Width(100));
        assert_eq!(resizer.output_size(300, 200), (100, 66));
    }

    #[test]
    fn test_width_target_never_yields_zero_height() {
        let resizer = Resizer::new(TargetSize::Width(10));
        assert_eq!(resizer.output_size(1000, 2), (10, 1));
    }

    #[test]
    fn test_exact_target_ignores_aspect_ratio() {
        let resizer = Resizer::new(TargetSize::Exact {
            width: 64,
            height: 64,
        });

        let out = resizer.process(RgbImage::new(640, 480)).unwrap();

        assert_eq!(out.dimensions(), (64, 64));
    }

    #[test]
    fn test_zero_target_is_an_error() {
        let resizer = Resizer::new(TargetSize::Width(0));
        assert!(resizer.process(RgbImage::new(4, 4)).is_err());
    }

    #[test]
    fn test_same_size_passes_through() {
        let resizer = Resizer::new(TargetSize::Width(8)).with_filter(FilterType::Nearest);
        let frame = RgbImage::from_fn(8, 4, |x, _| image::Rgb([x as u8, 0, 0]));

        let out = resizer.process(frame.clone()).unwrap();

        assert_eq!(out, frame);
    }
}
