//! feedhub camera client: entry point.
//!
//! # Usage
//!
//! ```text
//! feedhub-client [OPTIONS]
//!
//! Options:
//!   --server       <HOST:PORT>  Server address [default: 127.0.0.1:9000]
//!   --source-dir   <PATH>       Replay the images in this directory
//!   --loop                      Restart the directory when it runs out
//!   --frames       <N>          Stop after N frames
//!   --width        <PX>         Resize to this width (keeps aspect ratio)
//!   --height       <PX>         With --width, resize to exactly WIDTHxHEIGHT
//!   --flip         [DIR]        Mirror frames (horizontal | vertical)
//!   --fps          <FPS>        Frames per second [default: unlimited]
//!   --jpeg-quality <1-100>      JPEG quality [default: 95]
//!   --pattern-size <WxH>        Test pattern size when no --source-dir
//!   --name         <NAME>       Camera name shown in log lines [default: camera]
//! ```
//!
//! Without `--source-dir` the client streams a synthetic test pattern.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use feedhub_client::application::preprocessor::PreprocessorChain;
use feedhub_client::application::stream_frames::StreamOptions;
use feedhub_client::application::video_source::VideoSource;
use feedhub_client::infrastructure::network::FrameStreamer;
use feedhub_client::infrastructure::preprocess::{FlipDirection, Flipper, Resizer, TargetSize};
use feedhub_client::infrastructure::source::{ImageDirectorySource, TestPatternSource};
use feedhub_core::protocol::DEFAULT_JPEG_QUALITY;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// feedhub camera client.
#[derive(Debug, Parser)]
#[command(
    name = "feedhub-client",
    about = "Streams camera frames to a feedhub server",
    version
)]
struct Cli {
    /// Server address as host:port.
    #[arg(long, default_value = "127.0.0.1:9000", env = "FEEDHUB_SERVER")]
    server: String,

    /// Directory of image files to replay as the feed.
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Start the directory over after the last file.
    #[arg(long = "loop", requires = "source_dir")]
    looping: bool,

    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Resize frames to this width.
    #[arg(long)]
    width: Option<u32>,

    /// Together with --width, resize to exactly this height.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Mirror frames before sending.
    #[arg(long, num_args = 0..=1, default_missing_value = "horizontal")]
    flip: Option<FlipDirection>,

    /// Target frame rate.
    #[arg(long)]
    fps: Option<f64>,

    /// JPEG quality.
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Size of the synthetic test pattern, as WIDTHxHEIGHT.
    #[arg(long, default_value = "640x480", value_parser = parse_size)]
    pattern_size: (u32, u32),

    /// Camera name used in log lines.
    #[arg(long, default_value = "camera", env = "FEEDHUB_CAMERA_NAME")]
    name: String,
}

impl Cli {
    fn preprocessors(&self) -> PreprocessorChain {
        let mut chain = PreprocessorChain::new();
        if let Some(width) = self.width {
            let target = match self.height {
                Some(height) => TargetSize::Exact { width, height },
                None => TargetSize::Width(width),
            };
            chain.push(Box::new(Resizer::new(target)));
        }
        if let Some(direction) = self.flip {
            chain.push(Box::new(Flipper::new(direction)));
        }
        chain
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            jpeg_quality: self.jpeg_quality,
            fps: self.fps,
            max_frames: self.frames,
        }
    }

    fn source(&self) -> anyhow::Result<Box<dyn VideoSource>> {
        match &self.source_dir {
            Some(dir) => {
                let source = ImageDirectorySource::open(dir, self.looping)
                    .with_context(|| format!("opening {}", dir.display()))?;
                Ok(Box::new(source))
            }
            None => {
                let (width, height) = self.pattern_size;
                Ok(Box::new(TestPatternSource::new(width, height, self.frames)))
            }
        }
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid dimension '{v}'"))
    };
    Ok((parse(w)?, parse(h)?))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let span = info_span!("camera", name = %cli.name);
    let source = cli.source()?;
    let chain = cli.preprocessors();
    let options = cli.stream_options();

    let streamer = FrameStreamer::connect(&cli.server)
        .instrument(span.clone())
        .await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, stopping");
            ctrl_c.cancel();
        }
    });

    let summary = streamer
        .run(source, chain, options, cancel)
        .instrument(span.clone())
        .await?;
    span.in_scope(|| {
        info!(
            "sent {} frames ({} bytes), {:?}",
            summary.frames_sent, summary.bytes_sent, summary.ended
        )
    });
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["feedhub-client"]);

        // Assert
        assert_eq!(cli.server, "127.0.0.1:9000");
        assert_eq!(cli.jpeg_quality, 95);
        assert_eq!(cli.pattern_size, (640, 480));
        assert_eq!(cli.name, "camera");
        assert!(cli.source_dir.is_none());
        assert!(cli.preprocessors().is_empty());
        assert_eq!(cli.stream_options(), StreamOptions::default());
    }

    #[test]
    fn test_width_and_flip_build_two_stage_chain() {
        let cli = Cli::parse_from(["feedhub-client", "--width", "320", "--flip"]);

        let chain = cli.preprocessors();

        assert_eq!(chain.describe(), "resize -> flip");
        assert_eq!(cli.flip, Some(FlipDirection::Horizontal));
    }

    #[test]
    fn test_flip_accepts_direction() {
        let cli = Cli::parse_from(["feedhub-client", "--flip", "vertical"]);
        assert_eq!(cli.flip, Some(FlipDirection::Vertical));
    }

    #[test]
    fn test_height_requires_width() {
        let result = Cli::try_parse_from(["feedhub-client", "--height", "240"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_loop_requires_source_dir() {
        let result = Cli::try_parse_from(["feedhub-client", "--loop"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_jpeg_quality_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["feedhub-client", "--jpeg-quality", "0"]).is_err());
        assert!(Cli::try_parse_from(["feedhub-client", "--jpeg-quality", "101"]).is_err());
    }

    #[test]
    fn test_stream_options_from_flags() {
        let cli = Cli::parse_from(["feedhub-client", "--fps", "15", "--frames", "30"]);

        let options = cli.stream_options();

        assert_eq!(options.fps, Some(15.0));
        assert_eq!(options.max_frames, Some(30));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("320x240"), Ok((320, 240)));
        assert_eq!(parse_size("64X48"), Ok((64, 48)));
        assert!(parse_size("320").is_err());
        assert!(parse_size("0x10").is_err());
    }

    #[test]
    fn test_test_pattern_is_default_source() {
        let cli = Cli::parse_from(["feedhub-client", "--frames", "2"]);
        let mut source = cli.source().unwrap();

        assert_eq!(source.name(), "test-pattern");
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_source_dir_is_an_error() {
        let cli = Cli::parse_from(["feedhub-client", "--source-dir", "/nonexistent/frames"]);
        assert!(cli.source().is_err());
    }
}
