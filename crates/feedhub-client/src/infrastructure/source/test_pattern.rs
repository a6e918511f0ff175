//! Synthetic frames for running a camera without a camera.

use image::{Rgb, RgbImage};

use crate::application::video_source::{SourceError, VideoSource};

/// Generates a diagonal colour gradient that shifts a little every frame,
/// so consecutive frames differ.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    remaining: Option<u64>,
    index: u64,
}

impl TestPatternSource {
    /// `frames` of `None` never runs dry.
    pub fn new(width: u32, height: u32, frames: Option<u64>) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            remaining: frames,
            index: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let shift = (self.index % 32 * 8) as u32;
        let (w, h) = (self.width, self.height);
        RgbImage::from_fn(w, h, |x, y| {
            let r = (x * 255 / w + shift) % 256;
            let g = (y * 255 / h + shift) % 256;
            let b = ((x + y) * 255 / (w + h)) % 256;
            Rgb([r as u8, g as u8, b as u8])
        })
    }
}

impl VideoSource for TestPatternSource {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let frame = self.render();
        self.index += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_pattern_yields_exact_count() {
        let mut source = TestPatternSource::new(8, 6, Some(3));

        let frames: Vec<RgbImage> = std::iter::from_fn(|| source.next_frame().unwrap()).collect();

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.dimensions() == (8, 6)));
    }

    #[test]
    fn test_consecutive_frames_differ() {
        let mut source = TestPatternSource::new(8, 8, None);

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_infinite_pattern_keeps_going() {
        let mut source = TestPatternSource::new(2, 2, None);
        for _ in 0..100 {
            assert!(source.next_frame().unwrap().is_some());
        }
    }

    #[test]
    fn test_zero_size_is_clamped_to_one_pixel() {
        let mut source = TestPatternSource::new(0, 0, Some(1));
        assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (1, 1));
    }
}
