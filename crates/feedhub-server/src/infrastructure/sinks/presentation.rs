//! Headless presentation surface.
//!
//! Reports each presented frame to the log instead of drawing a window.  An
//! on-screen surface plugs in through the same [`PresentationSurface`] trait.

use feedhub_core::FrameMessage;
use tracing::{debug, info};

use crate::application::results_writer::{ClientSinkKey, PresentationSurface, SinkError};

#[derive(Debug)]
pub struct TracingSurface {
    key: ClientSinkKey,
    shown: u64,
    closed: bool,
}

impl TracingSurface {
    pub fn new(key: ClientSinkKey) -> Self {
        info!("presenting feed from {}", key.address);
        Self {
            key,
            shown: 0,
            closed: false,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }
}

impl PresentationSurface for TracingSurface {
    fn show(&mut self, frame: &FrameMessage) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.shown += 1;
        let (width, height) = frame.image.dimensions();
        let detections = frame
            .detection
            .as_ref()
            .map_or(0, |result| result.detections().len());
        debug!(
            "[{}] frame {} {width}x{height}, {detections} detections",
            self.key.address, self.shown
        );
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        info!(
            "closed feed from {} after {} frames",
            self.key.address, self.shown
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use uuid::Uuid;

    fn key() -> ClientSinkKey {
        ClientSinkKey {
            client_id: Uuid::new_v4(),
            address: "127.0.0.1:7000".parse().unwrap(),
        }
    }

    #[test]
    fn test_show_counts_frames() {
        let mut surface = TracingSurface::new(key());
        let frame = FrameMessage::new(Uuid::new_v4(), RgbImage::new(4, 4));

        surface.show(&frame).unwrap();
        surface.show(&frame).unwrap();

        assert_eq!(surface.frames_shown(), 2);
    }

    #[test]
    fn test_show_after_close_fails() {
        let mut surface = TracingSurface::new(key());
        surface.close();

        let result = surface.show(&FrameMessage::new(Uuid::new_v4(), RgbImage::new(1, 1)));

        assert!(matches!(result, Err(SinkError::Closed)));
    }
}
