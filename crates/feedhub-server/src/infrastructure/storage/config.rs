//! TOML configuration for the server.
//!
//! Every field has a serde default, so an empty file (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! bind_address = "0.0.0.0"
//! port = 9000
//!
//! [pipeline]
//! batch_size = 64
//! batch_window_ms = 100
//!
//! [writer]
//! mode = "save_frames"
//! save_folder = "processed_feed"
//! jpeg_quality = 95
//! ```
//!
//! Command-line flags are applied on top of the loaded file in `main.rs`;
//! [`ServerConfig::validate`] runs last.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use feedhub_core::protocol::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_FRAME_BYTES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::batch_processor::BatchConfig;
use crate::application::results_writer::{ResultWriterMode, WriterConfig};

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub writer: WriterSection,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenConfig {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest frame payload a client may announce.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

/// Queue sizes and batching policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_ingest_bus_capacity")]
    pub ingest_bus_capacity: usize,
    #[serde(default = "default_result_bus_capacity")]
    pub result_bus_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
    /// How long shutdown waits for each stage before giving up on it.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

/// Output sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriterSection {
    #[serde(default)]
    pub mode: ResultWriterMode,
    /// Root directory for saved frames.
    #[serde(default = "default_save_folder")]
    pub save_folder: PathBuf,
    /// JPEG quality (1-100) of archived frames.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Health report settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9000
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_ingest_bus_capacity() -> usize {
    1000
}
fn default_result_bus_capacity() -> usize {
    50
}
fn default_batch_size() -> usize {
    64
}
fn default_batch_window_ms() -> u64 {
    100
}
fn default_client_queue_capacity() -> usize {
    100
}
fn default_stop_timeout_ms() -> u64 {
    2000
}
fn default_save_folder() -> PathBuf {
    PathBuf::from("processed_feed")
}
fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}
fn default_report_interval_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ListenConfig::default(),
            pipeline: PipelineConfig::default(),
            writer: WriterSection::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest_bus_capacity: default_ingest_bus_capacity(),
            result_bus_capacity: default_result_bus_capacity(),
            batch_size: default_batch_size(),
            batch_window_ms: default_batch_window_ms(),
            client_queue_capacity: default_client_queue_capacity(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for WriterSection {
    fn default() -> Self {
        Self {
            mode: ResultWriterMode::default(),
            save_folder: default_save_folder(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_report_interval_secs(),
        }
    }
}

// ── Derived settings ──────────────────────────────────────────────────────────

impl ServerConfig {
    /// Checks every value the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        let non_zero = [
            ("pipeline.ingest_bus_capacity", self.pipeline.ingest_bus_capacity as u64),
            ("pipeline.result_bus_capacity", self.pipeline.result_bus_capacity as u64),
            ("pipeline.batch_size", self.pipeline.batch_size as u64),
            ("pipeline.batch_window_ms", self.pipeline.batch_window_ms),
            ("pipeline.client_queue_capacity", self.pipeline.client_queue_capacity as u64),
            ("report.interval_secs", self.report.interval_secs),
            ("server.max_frame_bytes", self.server.max_frame_bytes as u64),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.server.max_frame_bytes > u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "server.max_frame_bytes",
                reason: format!("must fit the 4-byte length prefix (<= {})", u32::MAX),
            });
        }
        if !(1..=100).contains(&self.writer.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "writer.jpeg_quality",
                reason: format!("{} is outside 1..=100", self.writer.jpeg_quality),
            });
        }
        Ok(())
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid {
                field: "server.bind_address",
                reason: format!("'{}': {e}", self.server.bind_address),
            })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.pipeline.batch_size,
            time_window: Duration::from_millis(self.pipeline.batch_window_ms),
        }
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            mode: self.writer.mode,
            client_queue_capacity: self.pipeline.client_queue_capacity,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline.stop_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report.interval_secs)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads `ServerConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Renders `config` as TOML, e.g. for `--print-config`.
///
/// # Errors
///
/// Returns [`ConfigError::Serialize`] if serialization fails.
pub fn to_toml(config: &ServerConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_server_config_default_matches_documented_values() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.pipeline.ingest_bus_capacity, 1000);
        assert_eq!(cfg.pipeline.result_bus_capacity, 50);
        assert_eq!(cfg.pipeline.batch_size, 64);
        assert_eq!(cfg.pipeline.batch_window_ms, 100);
        assert_eq!(cfg.pipeline.client_queue_capacity, 100);
        assert_eq!(cfg.writer.mode, ResultWriterMode::ShowFrames);
        assert_eq!(cfg.writer.jpeg_quality, 95);
        assert_eq!(cfg.report.interval_secs, 5);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_derived_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.batch_config().time_window, Duration::from_millis(100));
        assert_eq!(cfg.writer_config().client_queue_capacity, 100);
        assert_eq!(cfg.stop_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.report_interval(), Duration::from_secs(5));
        assert_eq!(cfg.listen_addr().unwrap(), "0.0.0.0:9000".parse().unwrap());
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_deserialize_partial_sections_override_defaults() {
        // Arrange
        let toml_str = r#"
log_level = "debug"

[pipeline]
batch_size = 8

[writer]
mode = "show_and_save_frames"
save_folder = "/var/feeds"
jpeg_quality = 80
"#;

        // Act
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.pipeline.batch_size, 8);
        assert_eq!(cfg.pipeline.batch_window_ms, 100);
        assert_eq!(cfg.writer.mode, ResultWriterMode::ShowAndSaveFrames);
        assert_eq!(cfg.writer.save_folder, PathBuf::from("/var/feeds"));
        assert_eq!(cfg.writer.jpeg_quality, 80);
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn test_deserialize_unknown_mode_is_parse_error() {
        let result: Result<ServerConfig, _> = toml::from_str("[writer]\nmode = \"print\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut cfg = ServerConfig::default();
        cfg.server.port = 9100;
        cfg.writer.mode = ResultWriterMode::SaveFrames;

        let text = to_toml(&cfg).unwrap();
        let restored: ServerConfig = toml::from_str(&text).unwrap();

        assert_eq!(cfg, restored);
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut cfg = ServerConfig::default();
        cfg.pipeline.batch_size = 0;

        let err = cfg.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "pipeline.batch_size",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_queue_capacity() {
        let mut cfg = ServerConfig::default();
        cfg.pipeline.client_queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_jpeg_quality() {
        for quality in [0, 101] {
            let mut cfg = ServerConfig::default();
            cfg.writer.jpeg_quality = quality;

            let err = cfg.validate().unwrap_err();

            assert!(err.to_string().contains("writer.jpeg_quality"), "{err}");
        }

        let mut cfg = ServerConfig::default();
        cfg.writer.jpeg_quality = 100;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bind_address() {
        let mut cfg = ServerConfig::default();
        cfg.server.bind_address = "not-an-ip".to_string();

        let err = cfg.validate().unwrap_err();

        assert!(err.to_string().contains("server.bind_address"), "{err}");
    }

    // ── load_config ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_load_config_reads_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedhub.toml");
        std::fs::write(&path, "[server]\nport = 9555\n").unwrap();

        // Act
        let cfg = load_config(&path).unwrap();

        // Assert
        assert_eq!(cfg.server.port, 9555);
    }

    #[test]
    fn test_load_config_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedhub.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::Io { .. })));
    }
}
