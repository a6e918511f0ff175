//! Detection results attached to frames by the inference stage.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the frame it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Clamps the box to a `width`×`height` frame and converts it to integer
    /// pixel coordinates `(x, y, w, h)`.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).min(width as f32);
        let y0 = self.y.max(0.0).min(height as f32);
        let x1 = (self.x + self.width).max(0.0).min(width as f32);
        let y1 = (self.y + self.height).max(0.0).min(height as f32);
        let w = (x1 - x0) as u32;
        let h = (y1 - y0) as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, w, h))
    }
}

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Output of a detection model for a single image.
///
/// Some models report boxes, others return the input re-rendered with their
/// own overlay.  Downstream sinks handle both.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    Detections(Vec<Detection>),
    Rendered(RgbImage),
}

impl DetectionResult {
    /// Returns the detections, or an empty slice for a rendered result.
    pub fn detections(&self) -> &[Detection] {
        match self {
            DetectionResult::Detections(d) => d,
            DetectionResult::Rendered(_) => &[],
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
