//! Detection overlay.

use feedhub_core::{DetectionResult, FrameMessage};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Box outline thickness in pixels.
const LINE_WIDTH: u32 = 2;

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([0, 255, 0]),
    Rgb([255, 64, 64]),
    Rgb([64, 128, 255]),
    Rgb([255, 200, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
];

/// Returns the image to present or store for `frame`.
///
/// A rendered result replaces the frame.  Box detections are drawn as hollow
/// rectangles, coloured by class.  Frames without a result are returned as is.
pub fn annotate(frame: &FrameMessage) -> RgbImage {
    match &frame.detection {
        Some(DetectionResult::Rendered(image)) => image.clone(),
        Some(DetectionResult::Detections(detections)) => {
            let mut canvas = frame.image.clone();
            let (width, height) = canvas.dimensions();
            for detection in detections {
                let Some((x, y, w, h)) = detection.bbox.clamp_to(width, height) else {
                    continue;
                };
                let color = PALETTE[detection.class_id as usize % PALETTE.len()];
                for inset in 0..LINE_WIDTH {
                    if w <= inset * 2 || h <= inset * 2 {
                        break;
                    }
                    let rect = Rect::at((x + inset) as i32, (y + inset) as i32)
                        .of_size(w - inset * 2, h - inset * 2);
                    draw_hollow_rect_mut(&mut canvas, rect, color);
                }
            }
            canvas
        }
        None => frame.image.clone(),
    }
}
