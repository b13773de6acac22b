//! Pipeline stage benchmarks
//!
//! Measures each stage on synthetic renders at a few resolutions. Analysis
//! stages should stay flat across sizes since they work on the downsampled
//! grid; only compositing scales with the pixel count.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chroma_bgremove::{
    color::distance, detect_background_color, remove_colored_background, select_chromakey_color,
    ChromaKeyProcessor, Color, PassthroughRenderer,
};
use image::{Rgb, RgbImage};
use tokio::runtime::Runtime;

const SIZES: [u32; 3] = [256, 1024, 2048];

fn green_screen(size: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(size, size, |x, y| {
        let dx = f64::from(x) - f64::from(size) / 2.0;
        let dy = f64::from(y) - f64::from(size) / 2.0;
        if (dx * dx + dy * dy).sqrt() < f64::from(size) / 3.0 {
            Rgb([224, 172, 105])
        } else {
            Rgb([10, 200, 10])
        }
    });
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .expect("Failed to encode benchmark image");
    buffer
}

fn bench_color_distance(c: &mut Criterion) {
    let a = Color::new(10, 200, 10);
    let b = Color::new(224, 172, 105);
    c.bench_function("color_distance", |bench| {
        bench.iter(|| distance(black_box(a), black_box(b)));
    });
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("chromakey_selection");
    for size in SIZES {
        let input = green_screen(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |bench, input| {
            bench.iter(|| select_chromakey_color(black_box(input)));
        });
    }
    group.finish();
}

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("background_detection");
    for size in SIZES {
        let input = green_screen(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |bench, input| {
            bench.iter(|| detect_background_color(black_box(input), Some(Color::GREEN), None));
        });
    }
    group.finish();
}

fn bench_compositing(c: &mut Criterion) {
    let mut group = c.benchmark_group("compositing");
    group.sample_size(20);
    for size in SIZES {
        let input = green_screen(size);
        group.throughput(Throughput::Elements(u64::from(size) * u64::from(size)));
        group.bench_with_input(BenchmarkId::new("feathered", size), &input, |bench, input| {
            bench.iter(|| remove_colored_background(black_box(input), Color::GREEN, 50, true, true));
        });
        group.bench_with_input(BenchmarkId::new("hard_edge", size), &input, |bench, input| {
            bench.iter(|| remove_colored_background(black_box(input), Color::GREEN, 50, false, false));
        });
    }
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create tokio runtime");
    let processor = ChromaKeyProcessor::default();
    let input = green_screen(1024);

    let mut group = c.benchmark_group("full_pipeline");
    group.sample_size(10);
    group.bench_function("passthrough_1024", |bench| {
        bench.iter(|| {
            rt.block_on(processor.process_with_renderer(&PassthroughRenderer, black_box(input.clone())))
                .expect("pipeline should succeed")
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_color_distance,
    bench_selection,
    bench_detection,
    bench_compositing,
    bench_full_pipeline
);
criterion_main!(benches);
