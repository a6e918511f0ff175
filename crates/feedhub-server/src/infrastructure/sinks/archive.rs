//! Per-client frame archive on disk.
//!
//! ```text
//! <save_folder>/
//! └── 192.168.1.20-51334_<client-id>/
//!     ├── 000000.jpg
//!     ├── 000001.jpg
//!     └── detections.jsonl      one JSON object per frame
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use feedhub_core::{encode_jpeg, ClientId, Detection, FrameMessage};
use serde::Serialize;
use tracing::info;

use crate::application::results_writer::{ClientSinkKey, FrameArchive, SinkError};
use crate::infrastructure::sinks::annotate::annotate;

const DETECTIONS_FILE: &str = "detections.jsonl";

/// One line of `detections.jsonl`.
#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    frame: u64,
    client_id: ClientId,
    file: &'a str,
    rendered: bool,
    detections: &'a [Detection],
}

/// Writes annotated JPEGs and a detections log for one client.
#[derive(Debug)]
pub struct JpegDirectoryArchive {
    dir: PathBuf,
    client_id: ClientId,
    quality: u8,
    next_index: u64,
    log: Option<BufWriter<File>>,
}

impl JpegDirectoryArchive {
    /// Creates `<root>/<address>_<client_id>/` and opens its detections log.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the directory or log cannot be created.
    pub fn create(root: &Path, key: &ClientSinkKey, quality: u8) -> Result<Self, SinkError> {
        let dir = root.join(client_dir_name(key));
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;

        let log_path = dir.join(DETECTIONS_FILE);
        let log = File::create(&log_path).map_err(|source| SinkError::Io {
            path: log_path,
            source,
        })?;

        info!("saving feed from {} to {}", key.address, dir.display());
        Ok(Self {
            dir,
            client_id: key.client_id,
            quality,
            next_index: 0,
            log: Some(BufWriter::new(log)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(DETECTIONS_FILE)
    }
}

/// Directory name for a client; `:` and brackets are not portable in paths.
fn client_dir_name(key: &ClientSinkKey) -> String {
    let address: String = key
        .address
        .to_string()
        .chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .map(|c| if c == ':' { '-' } else { c })
        .collect();
    format!("{address}_{}", key.client_id)
}

impl FrameArchive for JpegDirectoryArchive {
    fn persist(&mut self, frame: &FrameMessage) -> Result<(), SinkError> {
        let log_path = self.log_path();
        let Some(log) = self.log.as_mut() else {
            return Err(SinkError::Closed);
        };

        let index = self.next_index;
        let file_name = format!("{index:06}.jpg");
        let path = self.dir.join(&file_name);

        let image = annotate(frame);
        let bytes =
            encode_jpeg(&image, self.quality).map_err(|e| SinkError::Encode(e.to_string()))?;
        fs::write(&path, bytes).map_err(|source| SinkError::Io { path, source })?;

        let (rendered, detections) = match &frame.detection {
            Some(result) => (
                matches!(result, feedhub_core::DetectionResult::Rendered(_)),
                result.detections(),
            ),
            None => (false, &[][..]),
        };
        let record = FrameRecord {
            frame: index,
            client_id: self.client_id,
            file: &file_name,
            rendered,
            detections,
        };
        serde_json::to_writer(&mut *log, &record)
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        log.write_all(b"\n").map_err(|source| SinkError::Io {
            path: log_path,
            source,
        })?;

        self.next_index += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut log) = self.log.take() else {
            return Ok(());
        };
        log.flush().map_err(|source| SinkError::Io {
            path: self.log_path(),
            source,
        })?;
        info!(
            "saved {} frames to {}",
            self.next_index,
            self.dir.display()
        );
        Ok(())
    }
}
