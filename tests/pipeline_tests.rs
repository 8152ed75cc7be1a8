//! End-to-end tests across the sampler, both advection paths and the codec.

use std::sync::Arc;

use glam::Vec2;
use windtrail::codec::{self, AGE_SENTINEL};
use windtrail::distortion::Distortion;
use windtrail::gpu::{
    FieldTexture, GpuContext, ParticleEvolver, SoftwareEvolver, StateImage, StateLayout,
};
use windtrail::{
    build_field, Advector, AdvectorConfig, Bounds, Canvas, ColorBuckets, DenseField, FieldConfig,
    FieldEngine, Mask, Orthographic, Particle, Projection, RegularGrid, ResetPolicy, Spawner,
    VectorGrid, VisibilityMask, FADE_RETAIN,
};

/// Screen coordinates are degrees.
struct Identity;

impl Projection for Identity {
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
        Some([lon, lat])
    }

    fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        Some([x, y])
    }

    fn extent(&self) -> ([f64; 2], [f64; 2]) {
        ([0.0, 0.0], [99.0, 99.0])
    }

    fn distortion(&self, _lon: f64, _lat: f64, _x: f64, _y: f64) -> Distortion {
        Distortion::IDENTITY
    }
}

fn east_wind(u: f32) -> RegularGrid {
    RegularGrid::uniform(4, 4, 0.0, 99.0, 33.0, 33.0, u, 0.0)
}

fn inside_square(x: i32, y: i32) -> bool {
    (0..100).contains(&x) && (0..100).contains(&y)
}

fn square_field(u: f32) -> DenseField {
    let bounds = Bounds::new(0, 0, 99, 99);
    build_field(&Identity, &east_wind(u), &inside_square, bounds, &FieldConfig::new())
}

// ============================================================================
// CPU Path
// ============================================================================

#[test]
fn test_east_wind_scenario() {
    let field = square_field(10.0);
    assert!(!field.valid_positions().is_empty());

    let buckets = ColorBuckets::intensity_scale(10, 17.0);
    let mut advector = Advector::with_particles(
        AdvectorConfig::new(),
        vec![Particle::new(10.0, 10.0, 0)],
        buckets.clone(),
        Spawner::seeded(1),
    );
    let draw = advector.evolve(&field);

    let p = advector.particles()[0];
    assert_eq!(p.xt, Some(20.0));
    assert_eq!(p.yt, Some(10.0));

    let bucket = buckets.index_for(10.0);
    assert_eq!(draw.segment_count(), 1);
    assert_eq!(draw.buckets[bucket].len(), 1);
    assert_eq!(draw.buckets[bucket][0].to, Vec2::new(20.0, 10.0));

    advector.commit();
    assert_eq!(advector.particles()[0].position(), Vec2::new(20.0, 10.0));
}

#[test]
fn test_valid_spawn_guarantee() {
    let config = FieldConfig::new();
    let projection = Orthographic::fit(160, 120, 10.0, 20.0);
    let mask = VisibilityMask::from_projection(&projection, 160, 120);
    let grid = RegularGrid::from_fn(360, 181, 0.0, 90.0, 1.0, 1.0, |lon, _| {
        (5.0, lon.to_radians().sin() as f32)
    });
    let bounds = Bounds::for_view(&projection, 160, 120).unwrap();

    let field = build_field(&projection, &grid, &mask, bounds, &config);
    assert!(!field.valid_positions().is_empty());
    for &[x, y] in field.valid_positions() {
        let v = field.vector_at_pixel(x, y);
        assert!(v.is_defined(), "({x}, {y}) should be defined");
        assert!(v.magnitude.is_some_and(f32::is_finite));
        assert!(v.speed() < config.max_displacement);
    }
}

#[test]
fn test_globe_has_spawn_points_at_any_rotation() {
    let grid = RegularGrid::uniform(360, 181, 0.0, 90.0, 1.0, 1.0, 5.0, 0.0);
    let valid_at = |lon: f64| {
        let projection = Orthographic::fit(200, 200, lon, 0.0);
        let mask = VisibilityMask::from_projection(&projection, 200, 200);
        let bounds = Bounds::for_view(&projection, 200, 200).unwrap();
        build_field(&projection, &grid, &mask, bounds, &FieldConfig::new()).valid_positions().len()
    };

    let reference = valid_at(0.0);
    assert!(reference > 0);
    for lon in [-150.0, -30.0, 120.0, 180.0] {
        let valid = valid_at(lon);
        // Only the thin antimeridian strip may be lost
        assert!(valid * 10 > reference * 9, "centre {lon}: {valid} of {reference}");
    }
}

#[test]
fn test_engine_draws_onto_canvas() {
    let projection: Arc<dyn Projection> = Arc::new(Identity);
    let grid: Arc<dyn VectorGrid> = Arc::new(east_wind(3.0));
    let mask: Arc<dyn Mask> = Arc::new(inside_square);

    let mut engine = FieldEngine::new(AdvectorConfig::new(), FieldConfig::new(), 5);
    engine.rebuild(
        Some(projection),
        Some(grid),
        Some(mask),
        Some(Bounds::new(0, 0, 99, 99)),
        ResetPolicy::Reallocate,
    );
    engine.finish_scan();

    let mut canvas = Canvas::new(100, 100);
    let mut drawn = 0;
    for _ in 0..5 {
        let draw = engine.tick().expect("field is installed");
        drawn += draw.segment_count();
        canvas.render(&draw, FADE_RETAIN);
    }
    assert!(drawn > 0);
    assert!(canvas.as_raw().chunks(4).any(|px| px[3] > 0));
}

// ============================================================================
// GPU Rule (software mirror)
// ============================================================================

#[test]
fn test_cpu_respawn_matches_gpu_init() {
    let dense = square_field(10.0);
    let texture = FieldTexture::encode(&dense).unwrap();
    let seed = 99;
    let count = 32;

    // Every CPU particle is past its age limit, so the first tick respawns it
    let expired = vec![Particle::new(0.0, 0.0, AdvectorConfig::new().max_particle_age + 1); count];
    let mut advector = Advector::with_particles(
        AdvectorConfig::new(),
        expired,
        ColorBuckets::intensity_scale(10, 17.0),
        Spawner::hashed(seed),
    );
    advector.advance(&dense);

    // Every GPU particle starts at the sentinel, so the first pass initializes it
    let layout = StateLayout::for_particles(count as u32);
    let mut evolver = SoftwareEvolver::new(layout, &texture, seed);
    evolver.step(&texture);

    for (i, cpu) in advector.particles().iter().enumerate() {
        let (x, y, _) = evolver.current().particle(i as u32);
        assert!((x - cpu.x).abs() <= 1.0 / 16.0, "particle {i}: {x} vs {}", cpu.x);
        assert!((y - cpu.y).abs() <= 1.0 / 16.0, "particle {i}: {y} vs {}", cpu.y);
    }
}

#[test]
fn test_paths_agree_on_a_valid_step() {
    let dense = square_field(10.0);
    let texture = FieldTexture::encode(&dense).unwrap();
    let layout = StateLayout::for_particles(1);

    let mut advector = Advector::with_particles(
        AdvectorConfig::new(),
        vec![Particle::new(10.0, 10.0, 4)],
        ColorBuckets::intensity_scale(10, 17.0),
        Spawner::seeded(1),
    );
    advector.advance(&dense);

    let mut evolver = SoftwareEvolver::new(layout, &texture, 1);
    evolver.seed_state(StateImage::from_particles(layout, &[Particle::new(10.0, 10.0, 4)]));
    evolver.step(&texture);

    let cpu = advector.particles()[0];
    assert_eq!(evolver.current().particle(0), (cpu.x, cpu.y, cpu.age));
}

#[test]
fn test_paths_diverge_on_undefined_destination() {
    // Wind defined only left of x = 50
    let left = |x: i32, y: i32| x < 50 && (0..100).contains(&y);
    let bounds = Bounds::new(0, 0, 99, 99);
    let dense = build_field(&Identity, &east_wind(4.0), &left, bounds, &FieldConfig::new());
    let texture = FieldTexture::encode(&dense).unwrap();

    let mut advector = Advector::with_particles(
        AdvectorConfig::new(),
        vec![Particle::new(48.0, 10.0, 4)],
        ColorBuckets::intensity_scale(10, 17.0),
        Spawner::seeded(1),
    );
    let draw = advector.advance(&dense);
    assert_eq!(draw.segment_count(), 0);
    assert_eq!(advector.particles()[0].position(), Vec2::new(52.0, 10.0));

    let layout = StateLayout::for_particles(1);
    let mut evolver = SoftwareEvolver::new(layout, &texture, 1);
    evolver.seed_state(StateImage::from_particles(layout, &[Particle::new(48.0, 10.0, 4)]));
    evolver.step(&texture);
    assert_eq!(evolver.current().particle(0), (48.0, 10.0, AGE_SENTINEL));
}

#[test]
fn test_field_texture_matches_dense_field() {
    let dense = square_field(-7.5);
    let texture = FieldTexture::encode(&dense).unwrap();
    for (x, y) in [(0, 0), (10, 10), (33, 71), (99, 88)] {
        let v = dense.vector_at_pixel(x, y);
        let w = texture.wind_at_sample(x, y);
        assert!(w.is_valid());
        assert!((w.u - v.u).abs() <= 1.0 / 16.0);
        assert!((w.v - v.v).abs() <= 1.0 / 16.0);
    }
    // Seam guard drops rows past 89 degrees of latitude
    assert!(!texture.wind_at_sample(10, 95).is_valid());
    assert_eq!(codec::unpack_wind_bytes(texture.texel(95, 10)), codec::WindSample::INVALID);
}

// ============================================================================
// GPU (requires an adapter)
// ============================================================================

#[test]
fn test_gpu_matches_software_evolver() {
    let Ok(ctx) = GpuContext::new_headless() else {
        eprintln!("No GPU adapter, skipping");
        return;
    };
    let texture = FieldTexture::encode(&square_field(2.0)).unwrap();
    let layout = StateLayout::for_particles(64);

    let mut gpu = ParticleEvolver::new(&ctx, layout, &texture, 17).unwrap();
    let mut cpu = SoftwareEvolver::new(layout, &texture, 17);
    gpu.evolve(&ctx);
    cpu.step(&texture);

    let state = gpu.read_state(&ctx).unwrap();
    for i in 0..64 {
        let (gx, gy, gage) = state.particle(i);
        let (cx, cy, cage) = cpu.current().particle(i);
        assert!((gx - cx).abs() <= 1.0 / 16.0 + f32::EPSILON, "particle {i} x");
        assert!((gy - cy).abs() <= 1.0 / 16.0 + f32::EPSILON, "particle {i} y");
        assert!(gage.abs_diff(cage) <= 1, "particle {i} age");
    }
}
