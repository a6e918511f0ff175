//! Criterion benchmarks for the feedhub frame codec.
//!
//! Measures framing, reassembly and JPEG decode cost per frame at the
//! resolution the camera client sends by default.
//!
//! Run with:
//! ```bash
//! cargo bench --package feedhub-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use feedhub_core::protocol::{
    decode_frame, decode_jpeg, encode_frame, encode_jpeg, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_FRAME_BYTES,
};
use image::{Rgb, RgbImage};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]))
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for size in [16 * 1024usize, 256 * 1024] {
        let payload = vec![0xAB; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| encode_frame(black_box(p)).unwrap())
        });
    }
    group.finish();
}

fn bench_reassemble(c: &mut Criterion) {
    let stream: Vec<u8> = (0..32)
        .flat_map(|_| encode_frame(&[0x5A; 32 * 1024]).unwrap())
        .collect();

    c.bench_function("reassemble_32_frames_4k_reads", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(64 * 1024);
            let mut frames = 0usize;
            for piece in stream.chunks(4096) {
                buf.extend_from_slice(piece);
                while let Some((_, consumed)) =
                    decode_frame(&buf, DEFAULT_MAX_FRAME_BYTES).unwrap()
                {
                    frames += 1;
                    buf.drain(..consumed);
                }
            }
            black_box(frames)
        })
    });
}

fn bench_decode_jpeg(c: &mut Criterion) {
    let jpeg = encode_jpeg(&make_frame(640, 360), DEFAULT_JPEG_QUALITY).unwrap();
    c.bench_function("decode_jpeg_640x360", |b| {
        b.iter(|| decode_jpeg(black_box(&jpeg)).unwrap())
    });
}

criterion_group!(benches, bench_encode_frame, bench_reassemble, bench_decode_jpeg);
criterion_main!(benches);
