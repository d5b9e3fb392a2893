use affinity_fast::{calibrate, calibrate_sequential, joint_probabilities, CalibrationParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;

/// Squared distances between `n` points on a spiral
fn spiral_distances(n: usize) -> Array2<f32> {
    let points: Vec<(f32, f32)> = (0..n)
        .map(|i| {
            let t = i as f32 * 0.05;
            (t * t.cos(), t * t.sin())
        })
        .collect();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let dx = points[i].0 - points[j].0;
        let dy = points[i].1 - points[j].1;
        dx * dx + dy * dy
    })
}

fn bench_calibrate(c: &mut Criterion) {
    let params = CalibrationParams::default();
    let mut group = c.benchmark_group("calibrate");
    for n in [250usize, 1000, 2000] {
        let d = spiral_distances(n);
        group.bench_with_input(BenchmarkId::new("parallel", n), &d, |b, d| {
            b.iter(|| calibrate(black_box(d.view()), 30.0, &params, None))
        });
        group.bench_with_input(BenchmarkId::new("sequential", n), &d, |b, d| {
            b.iter(|| calibrate_sequential(black_box(d.view()), 30.0, &params, None))
        });
    }
    group.finish();
}

fn bench_joint(c: &mut Criterion) {
    let params = CalibrationParams::default();
    let d = spiral_distances(1000);
    c.bench_function("joint_probabilities_1000", |b| {
        b.iter(|| joint_probabilities(black_box(d.view()), 30.0, &params, None))
    });
}

criterion_group!(benches, bench_calibrate, bench_joint);
criterion_main!(benches);
