//! Headless demo: animate a synthetic wind field and save the trails.
//!
//! ```text
//! windtrail [output.png] [frames]
//! ```
//!
//! Runs the GPU path when an adapter is available and the CPU path otherwise.
//! Set `RUST_LOG=debug` for progress output.

use std::sync::Arc;

use log::{error, info, warn};

use windtrail::gpu::{
    FieldTexture, GpuContext, ParticleEvolver, StateLayout, TrailConfig, TrailRenderer,
};
use windtrail::{
    AdvectorConfig, Bounds, Canvas, EngineEvent, FieldConfig, FieldEngine, GpuError, Mask,
    Orthographic, ParticleTuning, Projection, RegularGrid, ResetPolicy, VectorGrid, VisibilityMask,
    FADE_RETAIN,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Two counter-rotating gyres with a westerly band between them.
fn synthetic_grid() -> RegularGrid {
    RegularGrid::from_fn(360, 181, 0.0, 90.0, 1.0, 1.0, |lon, lat| {
        let (sl, cl) = lon.to_radians().sin_cos();
        let (sp, cp) = (lat * 2.0).to_radians().sin_cos();
        let u = 12.0 * cp as f32 + 4.0 * sl as f32;
        let v = 8.0 * (sp * cl) as f32;
        (u, v)
    })
    .with_tuning(ParticleTuning::surface_wind(HEIGHT))
}

fn run_gpu(
    engine: &FieldEngine,
    bounds: Bounds,
    frames: u32,
    output: &str,
) -> Result<(), GpuError> {
    let ctx = GpuContext::new_headless()?;
    let Some(field) = FieldTexture::encode(engine.field()) else {
        warn!("Field is empty, nothing to evolve");
        return Ok(());
    };

    let count = AdvectorConfig::new().particle_count(&bounds) as u32;
    let mut evolver = ParticleEvolver::new(&ctx, StateLayout::for_particles(count), &field, 7)?;
    let mut trails = TrailRenderer::new(&ctx, WIDTH, HEIGHT, TrailConfig::new())?;

    let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Demo Target"),
        size: wgpu::Extent3d {
            width: WIDTH,
            height: HEIGHT,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: windtrail::gpu::TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

    for _ in 0..frames {
        evolver.evolve(&ctx);
        trails.render(&ctx, &evolver, &target_view);
    }

    let state = evolver.read_state(&ctx)?;
    let alive = (0..count).filter(|&i| !state.needs_init(i)).count();
    info!("GPU path: {} of {} particles alive after {} frames", alive, count, frames);

    let pixels = trails.read_accumulation(&ctx)?;
    match image::RgbaImage::from_raw(WIDTH, HEIGHT, pixels) {
        Some(img) => {
            if let Err(e) = img.save(output) {
                error!("Failed to save {}: {}", output, e);
            }
        }
        None => error!("Accumulation readback has the wrong size"),
    }
    Ok(())
}

fn run_cpu(engine: &mut FieldEngine, frames: u32, output: &str) {
    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    let mut segments = 0;
    for _ in 0..frames {
        if let Some(draw) = engine.tick() {
            segments += draw.segment_count();
            canvas.render(&draw, FADE_RETAIN);
        }
    }
    info!("CPU path: {} segments over {} frames", segments, frames);
    if let Err(e) = canvas.save_png(output) {
        error!("{}", e);
    }
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "windtrail.png".to_string());
    let frames = args.next().and_then(|s| s.parse().ok()).unwrap_or(120u32);

    let projection: Arc<dyn Projection> = Arc::new(Orthographic::fit(WIDTH, HEIGHT, -30.0, 25.0));
    let mask: Arc<dyn Mask> =
        Arc::new(VisibilityMask::from_projection(projection.as_ref(), WIDTH, HEIGHT));
    let grid: Arc<dyn VectorGrid> = Arc::new(synthetic_grid());
    let Some(bounds) = Bounds::for_view(projection.as_ref(), WIDTH, HEIGHT) else {
        error!("Globe is not on screen");
        return;
    };

    let mut engine = FieldEngine::new(AdvectorConfig::new(), FieldConfig::new(), 7);
    let events = engine.subscribe();
    engine.rebuild(Some(projection), Some(grid), Some(mask), Some(bounds), ResetPolicy::Reallocate);
    engine.finish_scan();
    for event in events.try_iter() {
        if let EngineEvent::FieldReady { valid } = event {
            info!("Field ready: {} valid pixels", valid);
        }
    }

    match run_gpu(&engine, bounds, frames, &output) {
        Ok(()) => {}
        Err(e) => {
            warn!("{}", e);
            run_cpu(&mut engine, frames, &output);
        }
    }
}
