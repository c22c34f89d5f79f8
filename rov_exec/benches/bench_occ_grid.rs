//! # Occupancy Grid Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nalgebra::Point2;
use rov_lib::{
    loc::Pose,
    occ_grid::{OccupancyGrid, Params},
    scanner::RangeSample,
};

fn occ_grid_benchmark(c: &mut Criterion) {
    // ---- Build a synthetic sweep ----

    // 19 readings across the default window, varying in range so the rays have different lengths
    let points: Vec<Point2<f64>> = (0..19)
        .map(|i| {
            let angle = 45.0 + 5.0 * i as f64;
            let distance = 40.0 + 120.0 * ((i as f64) * 0.7).sin().abs();
            RangeSample::new(angle, 90.0, distance).local_point()
        })
        .collect();

    let poses = [
        Pose::new(0.0, 0.0, 0.0),
        Pose::new(-50.0, 30.0, 0.6),
        Pose::new(120.0, -80.0, -2.1),
    ];

    let mut grid = OccupancyGrid::new(Params::default()).unwrap();

    c.bench_function("fuse one sweep", |b| {
        b.iter(|| {
            for pose in poses.iter() {
                black_box(grid.update_with_scan(pose, &points).unwrap());
            }
        })
    });

    c.bench_function("render map", |b| {
        b.iter(|| black_box(grid.render(&poses[0])))
    });
}

criterion_group!(benches, occ_grid_benchmark);
criterion_main!(benches);
