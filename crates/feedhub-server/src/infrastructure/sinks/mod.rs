//! Frame sinks for the results writer.
//!
//! - **`annotate`** – Draws detection boxes onto a copy of the frame.
//! - **`presentation`** – The headless presentation surface.
//! - **`archive`** – Per-client JPEG directories with a detections log.
//!
//! [`LocalSinkFactory`] wires these into the writer's [`SinkFactory`] seam.

pub mod annotate;
pub mod archive;
pub mod presentation;

use std::path::PathBuf;

use feedhub_core::protocol::DEFAULT_JPEG_QUALITY;

use crate::application::results_writer::{
    ClientSinkKey, FrameArchive, PresentationSurface, ResultWriterMode, SinkError, SinkFactory,
};

pub use annotate::annotate;
pub use archive::JpegDirectoryArchive;
pub use presentation::TracingSurface;

/// Opens [`TracingSurface`]s and [`JpegDirectoryArchive`]s under `save_folder`.
#[derive(Debug, Clone)]
pub struct LocalSinkFactory {
    save_folder: PathBuf,
    jpeg_quality: u8,
}

impl LocalSinkFactory {
    pub fn new(save_folder: impl Into<PathBuf>) -> Self {
        Self {
            save_folder: save_folder.into(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

impl SinkFactory for LocalSinkFactory {
    fn prepare(&self, mode: ResultWriterMode) -> Result<(), SinkError> {
        if mode.saves() {
            std::fs::create_dir_all(&self.save_folder).map_err(|source| SinkError::Io {
                path: self.save_folder.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn open_surface(&self, key: &ClientSinkKey) -> Result<Box<dyn PresentationSurface>, SinkError> {
        Ok(Box::new(TracingSurface::new(*key)))
    }

    fn open_archive(&self, key: &ClientSinkKey) -> Result<Box<dyn FrameArchive>, SinkError> {
        let archive = JpegDirectoryArchive::create(&self.save_folder, key, self.jpeg_quality)?;
        Ok(Box::new(archive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedhub_core::FrameMessage;
    use image::{Rgb, RgbImage};
    use uuid::Uuid;

    #[test]
    fn test_prepare_creates_save_folder_only_when_saving() {
        let dir = tempfile::tempdir().unwrap();
        let show_only = LocalSinkFactory::new(dir.path().join("shown"));
        let saving = LocalSinkFactory::new(dir.path().join("saved"));

        show_only.prepare(ResultWriterMode::ShowFrames).unwrap();
        saving.prepare(ResultWriterMode::ShowAndSaveFrames).unwrap();

        assert!(!dir.path().join("shown").exists());
        assert!(dir.path().join("saved").is_dir());
    }

    #[test]
    fn test_open_archive_creates_client_directory() {
        let dir = tempfile::tempdir().unwrap();
        let factory = LocalSinkFactory::new(dir.path());
        let key = ClientSinkKey {
            client_id: Uuid::new_v4(),
            address: "10.1.2.3:4567".parse().unwrap(),
        };

        let mut archive = factory.open_archive(&key).unwrap();
        archive.close().unwrap();

        let expected = dir.path().join(format!("10.1.2.3-4567_{}", key.client_id));
        assert!(expected.is_dir());
    }

    #[test]
    fn test_jpeg_quality_reaches_saved_frames() {
        // Arrange: the same noisy frame archived at two qualities
        let dir = tempfile::tempdir().unwrap();
        let key = ClientSinkKey {
            client_id: Uuid::new_v4(),
            address: "10.1.2.3:4567".parse().unwrap(),
        };
        let image = RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 37 ^ y * 91) as u8, (x * y) as u8, (x + 3 * y) as u8])
        });
        let frame = FrameMessage::new(key.client_id, image);

        // Act
        let saved_size = |quality: u8| {
            let root = dir.path().join(format!("q{quality}"));
            let factory = LocalSinkFactory::new(&root).with_jpeg_quality(quality);
            let mut archive = factory.open_archive(&key).unwrap();
            archive.persist(&frame).unwrap();
            archive.close().unwrap();
            let file = root
                .join(format!("10.1.2.3-4567_{}", key.client_id))
                .join("000000.jpg");
            std::fs::metadata(file).unwrap().len()
        };
        let low = saved_size(10);
        let high = saved_size(100);

        // Assert
        assert!(low < high, "quality 10 wrote {low} bytes, quality 100 wrote {high}");
    }
}
