//! Bundled detection model.

use feedhub_core::DetectionResult;
use image::RgbImage;

use crate::application::batch_processor::{DetectionModel, ModelError};

/// Stand-in model that finds nothing.
///
/// Returns an empty detection list for every image, which keeps the whole
/// pipeline running end to end until a real model is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderModel;

impl DetectionModel for PlaceholderModel {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn detect(&self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, ModelError> {
        Ok(images
            .iter()
            .map(|_| DetectionResult::Detections(Vec::new()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_returns_one_empty_result_per_image() {
        let images = vec![RgbImage::new(2, 2); 3];

        let results = PlaceholderModel.detect(&images).unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.detections().is_empty()));
    }

    #[test]
    fn test_placeholder_accepts_empty_batch() {
        assert!(PlaceholderModel.detect(&[]).unwrap().is_empty());
    }
}
