//! Integration tests for the camera client.
//!
//! A plain `TcpListener` stands in for the server and decodes what arrives.

use std::path::Path;

use feedhub_client::application::preprocessor::PreprocessorChain;
use feedhub_client::application::stream_frames::{StreamEnd, StreamOptions};
use feedhub_client::infrastructure::network::FrameStreamer;
use feedhub_client::infrastructure::preprocess::{FlipDirection, Flipper, Resizer, TargetSize};
use feedhub_client::infrastructure::source::{ImageDirectorySource, TestPatternSource};
use feedhub_core::protocol::DEFAULT_MAX_FRAME_BYTES;
use feedhub_core::{decode_frame, decode_jpeg};
use image::{Rgb, RgbImage};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Accepts one connection and returns every decoded frame once it closes.
async fn receiving_server() -> (String, JoinHandle<Vec<RgbImage>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();

        let mut frames = Vec::new();
        let mut buf = received.as_slice();
        while let Some((payload, used)) = decode_frame(buf, DEFAULT_MAX_FRAME_BYTES).unwrap() {
            frames.push(decode_jpeg(payload).unwrap());
            buf = &buf[used..];
        }
        assert!(buf.is_empty());
        frames
    });
    (addr, handle)
}

fn write_frames(dir: &Path, count: u32) {
    for i in 0..count {
        // Left half bright, right half dark, so a mirror is detectable.
        let frame = RgbImage::from_fn(200, 100, |x, _| {
            if x < 100 {
                Rgb([250, 250, 250])
            } else {
                Rgb([5, 5, 5])
            }
        });
        frame.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
    }
}

#[tokio::test]
async fn test_directory_feed_is_resized_flipped_and_sent_in_order() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 3);
    let (addr, server) = receiving_server().await;
    let source = ImageDirectorySource::open(dir.path(), false).unwrap();
    let chain = PreprocessorChain::new()
        .with(Box::new(Resizer::new(TargetSize::Width(100))))
        .with(Box::new(Flipper::new(FlipDirection::Horizontal)));

    // Act
    let streamer = FrameStreamer::connect(&addr).await.unwrap();
    let summary = streamer
        .run(source, chain, StreamOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    let frames = server.await.unwrap();

    // Assert
    assert_eq!(summary.frames_sent, 3);
    assert_eq!(summary.ended, StreamEnd::SourceExhausted);
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!(frame.dimensions(), (100, 50));
        // After the mirror the bright half is on the right.
        assert!(frame.get_pixel(5, 25)[0] < 60);
        assert!(frame.get_pixel(95, 25)[0] > 190);
    }
}

#[tokio::test]
async fn test_looping_directory_with_frame_limit() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 2);
    let (addr, server) = receiving_server().await;
    let source = ImageDirectorySource::open(dir.path(), true).unwrap();
    let options = StreamOptions {
        max_frames: Some(5),
        ..StreamOptions::default()
    };

    let summary = FrameStreamer::connect(&addr)
        .await
        .unwrap()
        .run(source, PreprocessorChain::new(), options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.ended, StreamEnd::FrameLimit);
    assert_eq!(server.await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_server_going_away_surfaces_io_error() {
    // Arrange: a server that hangs up immediately.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    // Act
    let result = FrameStreamer::connect(&addr)
        .await
        .unwrap()
        .run(
            TestPatternSource::new(640, 480, None),
            PreprocessorChain::new(),
            StreamOptions::default(),
            CancellationToken::new(),
        )
        .await;

    // Assert
    assert!(result.is_err());
}
