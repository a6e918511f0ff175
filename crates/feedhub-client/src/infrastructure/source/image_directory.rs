//! Replays the image files of a directory as a video feed.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::debug;

use crate::application::video_source::{SourceError, VideoSource};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Yields every image file of a directory in file-name order.
///
/// Files are listed once at construction.  With `looping` the source starts
/// over after the last file and never runs dry.
#[derive(Debug)]
pub struct ImageDirectorySource {
    name: String,
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ImageDirectorySource {
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the directory cannot be listed and
    /// [`SourceError::Empty`] if it holds no supported image files.
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let io_error = |source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        files.sort();
        debug!("{} image files in {}", files.len(), dir.display());

        Ok(Self {
            name: format!("dir:{}", dir.display()),
            files,
            next: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl VideoSource for ImageDirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;

        let image = image::open(path).map_err(|e| SourceError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(image.to_rgb8()))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
