use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Matrix4;
use stereo_geometry::{depth_millimeters, disparity_to_points, DisparityMap};

fn reprojection() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 0.0, -320.0, //
        0.0, 1.0, 0.0, -240.0, //
        0.0, 0.0, 0.0, 400.0, //
        0.0, 0.0, 10.0, 0.0,
    )
}

fn synthetic_disparity(width: u32, height: u32) -> DisparityMap {
    let data = (0..width * height)
        .map(|i| if i % 7 == 0 { 0 } else { (16 + (i % 1200)) as i16 })
        .collect();
    DisparityMap {
        width,
        height,
        data,
    }
}

fn bench_disparity_to_points(c: &mut Criterion) {
    let map = synthetic_disparity(640, 480);
    let q = reprojection();
    c.bench_function("disparity_to_points_vga", |b| {
        b.iter(|| disparity_to_points(black_box(&map), black_box(&q)))
    });
}

fn bench_depth_millimeters(c: &mut Criterion) {
    let cloud = disparity_to_points(&synthetic_disparity(640, 480), &reprojection());
    c.bench_function("depth_millimeters_vga", |b| {
        b.iter(|| depth_millimeters(black_box(&cloud)))
    });
}

criterion_group!(benches, bench_disparity_to_points, bench_depth_millimeters);
criterion_main!(benches);
