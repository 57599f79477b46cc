//! Per-frame feature extraction benchmarks.
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --package crowdwatch-media --bench feature_extraction
//! ```
//!
//! # Metrics Measured
//! - Motion estimation latency at several source resolutions
//! - Geometric density latency
//! - Single-frame edge energy latency

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use crowdwatch_media::{
    edge_energy, DensityEstimator, Frame, GeometricDensity, MotionConfig, MotionEnergyEstimator,
};
use image::{Rgb, RgbImage};

/// Synthetic textured frame, shifted horizontally by `shift` pixels.
fn create_test_frame(index: u64, width: u32, height: u32, shift: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let xs = x + shift;
        Rgb([
            ((xs * 7 + y * 11) % 256) as u8,
            ((xs * 13 + y * 17) % 256) as u8,
            ((xs * 19 + y * 23) % 256) as u8,
        ])
    });
    Frame::new(index, index * 33, image)
}

fn bench_motion(c: &mut Criterion) {
    let mut group = c.benchmark_group("motion_energy");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for (width, height) in [(1280, 720), (640, 360)] {
        let a = create_test_frame(0, width, height, 0);
        let b = create_test_frame(1, width, height, 2);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("estimate", format!("{width}x{height}")),
            &(a, b),
            |bench, (a, b)| {
                let mut estimator = MotionEnergyEstimator::new(MotionConfig::default());
                let mut flip = false;
                bench.iter(|| {
                    flip = !flip;
                    let frame = if flip { a } else { b };
                    black_box(estimator.estimate(black_box(frame)).ok())
                });
            },
        );
    }
    group.finish();
}

fn bench_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("density");
    let density = GeometricDensity::default();
    let frame = create_test_frame(0, 640, 360, 0);

    group.bench_function("geometric_640x360", |bench| {
        bench.iter(|| black_box(density.estimate(black_box(&frame)).ok()))
    });
    group.bench_function("edge_energy_640x360", |bench| {
        let gray = frame.to_gray();
        bench.iter(|| black_box(edge_energy(black_box(&gray)).ok()))
    });
    group.finish();
}

criterion_group!(benches, bench_motion, bench_density);
criterion_main!(benches);
