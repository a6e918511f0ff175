//! feedhub server: entry point.
//!
//! Accepts camera feeds over TCP, batches their frames through a detection
//! model and writes the results out per camera.
//!
//! # Usage
//!
//! ```text
//! feedhub-server [OPTIONS]
//!
//! Options:
//!   --config        <PATH>  TOML config file [default: feedhub.toml]
//!   --bind          <IP>    Listen address (overrides server.bind_address)
//!   --port          <PORT>  Listen port (overrides server.port)
//!   --mode          <MODE>  show_frames | save_frames | show_and_save_frames
//!   --save-folder   <PATH>  Root folder for saved frames
//!   --jpeg-quality  <1-100> JPEG quality of saved frames
//!   --batch-size    <N>     Frames per inference batch
//!   --batch-window-ms <MS>  Longest wait for a batch to fill
//!   --report-interval <SECS> Health report period
//!   --print-config          Print the effective config and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Overrides                 |
//! |------------------------|---------------------------|
//! | `FEEDHUB_CONFIG`       | `--config`                |
//! | `FEEDHUB_BIND`         | `server.bind_address`     |
//! | `FEEDHUB_PORT`         | `server.port`             |
//! | `FEEDHUB_MODE`         | `writer.mode`             |
//! | `FEEDHUB_SAVE_FOLDER`  | `writer.save_folder`      |
//! | `FEEDHUB_BATCH_SIZE`   | `pipeline.batch_size`     |
//!
//! `RUST_LOG` takes precedence over the config file's `log_level`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

use feedhub_server::app::{App, AppComponents};
use feedhub_server::application::results_writer::ResultWriterMode;
use feedhub_server::infrastructure::model::PlaceholderModel;
use feedhub_server::infrastructure::sinks::LocalSinkFactory;
use feedhub_server::infrastructure::storage::config::{load_config, to_toml, ServerConfig};
use feedhub_server::infrastructure::telemetry::ProcFsMetrics;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// feedhub camera feed server.
#[derive(Debug, Parser)]
#[command(
    name = "feedhub-server",
    about = "Ingests camera feeds, batches frames for detection and fans results out per camera",
    version
)]
struct Cli {
    /// TOML configuration file.  A missing file means "all defaults".
    #[arg(long, default_value = "feedhub.toml", env = "FEEDHUB_CONFIG")]
    config: PathBuf,

    /// IP address to listen on.
    #[arg(long, env = "FEEDHUB_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "FEEDHUB_PORT")]
    port: Option<u16>,

    /// Which sinks each camera's results go to.
    #[arg(long, env = "FEEDHUB_MODE")]
    mode: Option<ResultWriterMode>,

    /// Root folder for saved frames.
    #[arg(long, env = "FEEDHUB_SAVE_FOLDER")]
    save_folder: Option<PathBuf>,

    /// JPEG quality of saved frames.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: Option<u8>,

    /// Maximum frames per inference batch.
    #[arg(long, env = "FEEDHUB_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Longest time to wait for a batch to fill, in milliseconds.
    #[arg(long)]
    batch_window_ms: Option<u64>,

    /// Health report period in seconds.
    #[arg(long)]
    report_interval: Option<u64>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.mode {
            config.writer.mode = mode;
        }
        if let Some(save_folder) = self.save_folder {
            config.writer.save_folder = save_folder;
        }
        if let Some(quality) = self.jpeg_quality {
            config.writer.jpeg_quality = quality;
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if let Some(window) = self.batch_window_ms {
            config.pipeline.batch_window_ms = window;
        }
        if let Some(interval) = self.report_interval {
            config.report.interval_secs = interval;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let print_config = cli.print_config;
    let config = cli.into_server_config()?;

    if print_config {
        print!("{}", to_toml(&config)?);
        return Ok(());
    }

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the config file's `log_level` applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "feedhub server starting (mode={}, batch_size={}, window={}ms)",
        config.writer.mode, config.pipeline.batch_size, config.pipeline.batch_window_ms
    );

    let components = AppComponents {
        model: Arc::new(PlaceholderModel),
        sinks: Arc::new(
            LocalSinkFactory::new(&config.writer.save_folder)
                .with_jpeg_quality(config.writer.jpeg_quality),
        ),
        metrics: Box::new(ProcFsMetrics::new()),
    };
    let mut app = App::start(&config, components, info_span!("feedhub"))
        .await
        .context("starting server")?;
    info!("accepting cameras on {}", app.local_addr());

    // ── Wait for Ctrl+C ───────────────────────────────────────────────────────
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
    }

    app.stop().await;
    info!("feedhub server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
