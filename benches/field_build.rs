use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use windtrail::codec;
use windtrail::gpu::{FieldTexture, SoftwareEvolver, StateLayout};
use windtrail::{
    build_field, Advector, AdvectorConfig, Bounds, ColorBuckets, FieldConfig, Orthographic,
    RegularGrid, Spawner, VisibilityMask,
};

const WIDTH: u32 = 400;
const HEIGHT: u32 = 300;

fn grid() -> RegularGrid {
    RegularGrid::from_fn(360, 181, 0.0, 90.0, 1.0, 1.0, |lon, lat| {
        let u = 10.0 * lat.to_radians().cos() as f32;
        let v = 5.0 * lon.to_radians().sin() as f32;
        (u, v)
    })
}

fn bench_field_build(c: &mut Criterion) {
    let projection = Orthographic::fit(WIDTH, HEIGHT, 0.0, 30.0);
    let mask = VisibilityMask::from_projection(&projection, WIDTH, HEIGHT);
    let grid = grid();
    let Some(bounds) = Bounds::for_view(&projection, WIDTH, HEIGHT) else {
        return;
    };

    c.bench_function("build_field_stride_2", |b| {
        let config = FieldConfig::new();
        b.iter(|| build_field(&projection, &grid, &mask, black_box(bounds), &config))
    });

    let field = build_field(&projection, &grid, &mask, bounds, &FieldConfig::new());

    c.bench_function("encode_field_texture", |b| {
        b.iter(|| FieldTexture::encode(black_box(&field)))
    });

    c.bench_function("advector_advance", |b| {
        let buckets = ColorBuckets::intensity_scale(10, 17.0);
        let spawner = Spawner::seeded(1);
        let mut advector = Advector::new(AdvectorConfig::new(), &field, buckets, spawner);
        b.iter(|| advector.advance(black_box(&field)))
    });

    if let Some(texture) = FieldTexture::encode(&field) {
        c.bench_function("software_evolve_2k", |b| {
            let mut evolver = SoftwareEvolver::new(StateLayout::for_particles(2048), &texture, 1);
            b.iter(|| evolver.step(black_box(&texture)))
        });
    }
}

fn bench_codec(c: &mut Criterion) {
    c.bench_function("pack_unpack_wind", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for i in 0..1024 {
                let u = (i as f32 - 512.0) / 8.0;
                acc += codec::unpack_wind_bytes(codec::pack_wind_bytes(black_box(u), -u, true)).u;
            }
            acc
        })
    });
}

criterion_group!(benches, bench_field_build, bench_codec);
criterion_main!(benches);
