//! Trail rendering from the two most recent state textures.
//!
//! Trails are not stored per particle. Each frame the accumulation texture is
//! faded by a low-alpha black quad, one thin quad per particle is drawn from
//! its previous to its current position, and the accumulation texture is then
//! composited onto the target. Repeated partial fades leave the streaks.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::codec::AGE_SENTINEL;
use crate::error::GpuError;
use crate::shader_utils;
use crate::visuals::ColorStyle;

use super::evolver::ParticleEvolver;
use super::{
    create_pipeline, fade_blend_state, texture_entry, uniform_entry, GpuContext, FULLSCREEN_WGSL,
};

/// Trail appearance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrailConfig {
    /// Half the quad width in pixels.
    pub half_width: f32,
    /// Alpha of the fade quad; the accumulation keeps `1 - fade_alpha` per frame.
    pub fade_alpha: f32,
    /// Straight-alpha RGBA in `[0, 1]`.
    pub color: [f32; 4],
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            half_width: 0.5,
            fade_alpha: 0.03,
            color: [1.0, 1.0, 1.0, 0.9],
        }
    }
}

impl TrailConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_half_width(mut self, half_width: f32) -> Self {
        self.half_width = half_width.max(0.0);
        self
    }

    pub fn with_fade_alpha(mut self, alpha: f32) -> Self {
        self.fade_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_color(mut self, style: ColorStyle) -> Self {
        self.color = style.to_unorm();
        self
    }
}

/// Uniforms shared by the fade and trail passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct TrailParams {
    view_size: [f32; 2],
    half_width: f32,
    state_side: u32,
    color: [f32; 4],
    particle_count: u32,
    fade_alpha: f32,
    _pad: [u32; 2],
}

/// Whether a particle moved normally between two frames.
///
/// A sentinel on either side, or an age that did not advance by exactly one
/// (a respawn), means the two positions are unrelated.
pub fn segment_visible(prev_age: u32, cur_age: u32) -> bool {
    prev_age != AGE_SENTINEL && cur_age != AGE_SENTINEL && cur_age == prev_age.wrapping_add(1)
}

/// Corners of the quad the trail pass emits, in pixels.
///
/// Two triangles `(a-n, a+n, b-n)` and `(b-n, a+n, b+n)` where `n` is the
/// unit normal of `a -> b` scaled by `half_width`. `None` when the quad
/// collapses.
pub fn trail_quad(
    prev: Vec2,
    prev_age: u32,
    cur: Vec2,
    cur_age: u32,
    half_width: f32,
) -> Option<[Vec2; 6]> {
    if !segment_visible(prev_age, cur_age) {
        return None;
    }
    let d = cur - prev;
    let len = d.length();
    if len <= 0.0 {
        return None;
    }
    let n = d.perp() / len * half_width;
    Some([prev - n, prev + n, cur - n, cur - n, prev + n, cur + n])
}

/// Pixel position to normalized device coordinates, y up.
pub fn to_ndc(p: Vec2, view_size: Vec2) -> Vec2 {
    let ndc = p / view_size * 2.0 - Vec2::ONE;
    Vec2::new(ndc.x, -ndc.y)
}

/// Fading accumulation texture plus the passes that feed and present it.
///
/// Quads are alpha blended onto the accumulation, which leaves its color
/// premultiplied; the composite pass blends it as such.
pub struct TrailRenderer {
    config: TrailConfig,
    width: u32,
    height: u32,
    accumulation: wgpu::Texture,
    accumulation_view: wgpu::TextureView,
    params_buffer: wgpu::Buffer,
    fade_pipeline: wgpu::RenderPipeline,
    fade_bind_group: wgpu::BindGroup,
    trail_pipeline: wgpu::RenderPipeline,
    trail_layout: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::RenderPipeline,
    composite_layout: wgpu::BindGroupLayout,
    composite_bind_group: wgpu::BindGroup,
    first_frame: bool,
}

impl TrailRenderer {
    /// Create a renderer for a `width` x `height` view.
    pub fn new(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        config: TrailConfig,
    ) -> Result<Self, GpuError> {
        let (accumulation, accumulation_view) = create_accumulation(ctx, width, height)?;

        ctx.push_validation_scope();
        let params_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Trail Params Buffer"),
            contents: bytemuck::bytes_of(&TrailParams::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // Fade
        let fade_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Trail Fade Bind Group Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::FRAGMENT)],
        });
        let fade_shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trail Fade Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_fade_shader().into()),
        });
        let fade_pipeline = create_pipeline(
            &ctx.device,
            "Trail Fade Pipeline",
            &fade_layout,
            &fade_shader,
            "vs_fullscreen",
            Some(fade_blend_state()),
        );
        let fade_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Fade Bind Group"),
            layout: &fade_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        // Quads
        let trail_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Trail Bind Group Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                texture_entry(1, wgpu::ShaderStages::VERTEX),
                texture_entry(2, wgpu::ShaderStages::VERTEX),
            ],
        });
        let trail_shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trail Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_trail_shader().into()),
        });
        let trail_pipeline = create_pipeline(
            &ctx.device,
            "Trail Pipeline",
            &trail_layout,
            &trail_shader,
            "vs_trail",
            Some(wgpu::BlendState::ALPHA_BLENDING),
        );

        // Composite
        let composite_layout =
            ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Trail Composite Bind Group Layout"),
                entries: &[texture_entry(0, wgpu::ShaderStages::FRAGMENT)],
            });
        let composite_shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trail Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_composite_shader().into()),
        });
        let composite_pipeline = create_pipeline(
            &ctx.device,
            "Trail Composite Pipeline",
            &composite_layout,
            &composite_shader,
            "vs_fullscreen",
            Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        );
        let composite_bind_group =
            create_composite_bind_group(ctx, &composite_layout, &accumulation_view);

        ctx.pop_validation_scope()?;
        info!("Trail renderer created for {}x{} view", width, height);

        Ok(Self {
            config,
            width,
            height,
            accumulation,
            accumulation_view,
            params_buffer,
            fade_pipeline,
            fade_bind_group,
            trail_pipeline,
            trail_layout,
            composite_pipeline,
            composite_layout,
            composite_bind_group,
            first_frame: true,
        })
    }

    pub fn config(&self) -> &TrailConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TrailConfig) {
        self.config = config;
    }

    /// Clear instead of fading on the next frame.
    pub fn reset(&mut self) {
        self.first_frame = true;
    }

    /// Reallocate the accumulation texture for a new view size.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> Result<(), GpuError> {
        let (accumulation, accumulation_view) = create_accumulation(ctx, width, height)?;
        self.composite_bind_group =
            create_composite_bind_group(ctx, &self.composite_layout, &accumulation_view);
        self.accumulation = accumulation;
        self.accumulation_view = accumulation_view;
        self.width = width;
        self.height = height;
        self.first_frame = true;
        debug!("Trail accumulation resized to {}x{}", width, height);
        Ok(())
    }

    /// Fade, draw this tick's segments, then composite onto `target`.
    ///
    /// `target` must be an RGBA8 view of the same size as the renderer.
    pub fn render(
        &mut self,
        ctx: &GpuContext,
        evolver: &ParticleEvolver,
        target: &wgpu::TextureView,
    ) {
        let layout = evolver.layout();
        let params = TrailParams {
            view_size: [self.width as f32, self.height as f32],
            half_width: self.config.half_width,
            state_side: layout.side(),
            color: self.config.color,
            particle_count: layout.particle_count(),
            fade_alpha: self.config.fade_alpha,
            _pad: [0; 2],
        };
        ctx.queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let trail_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Bind Group"),
            layout: &self.trail_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(evolver.previous_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(evolver.current_view()),
                },
            ],
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Trail Encoder"),
        });

        {
            let load = if self.first_frame {
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
            } else {
                wgpu::LoadOp::Load
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Trail Accumulation Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.accumulation_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if !self.first_frame {
                pass.set_pipeline(&self.fade_pipeline);
                pass.set_bind_group(0, &self.fade_bind_group, &[]);
                pass.draw(0..3, 0..1);
            }

            pass.set_pipeline(&self.trail_pipeline);
            pass.set_bind_group(0, &trail_bind_group, &[]);
            pass.draw(0..6, 0..layout.particle_count());
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Trail Composite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.composite_pipeline);
            pass.set_bind_group(0, &self.composite_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        ctx.queue.submit(Some(encoder.finish()));
        self.first_frame = false;
    }

    /// Read the accumulation texture back as RGBA8 rows.
    pub fn read_accumulation(&self, ctx: &GpuContext) -> Result<Vec<u8>, GpuError> {
        ctx.read_texture(&self.accumulation, self.width, self.height)
    }
}

fn create_accumulation(
    ctx: &GpuContext,
    width: u32,
    height: u32,
) -> Result<(wgpu::Texture, wgpu::TextureView), GpuError> {
    let texture = ctx.create_texture(
        "Trail Accumulation Texture",
        width,
        height,
        wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
    )?;
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok((texture, view))
}

fn create_composite_bind_group(
    ctx: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    accumulation_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Trail Composite Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(accumulation_view),
        }],
    })
}

const TRAIL_PARAMS_WGSL: &str = r#"
struct TrailParams {
    view_size: vec2<f32>,
    half_width: f32,
    state_side: u32,
    color: vec4<f32>,
    particle_count: u32,
    fade_alpha: f32,
    _pad0: u32,
    _pad1: u32,
};
"#;

fn generate_fade_shader() -> String {
    format!(
        r#"{fullscreen}
{params}
@group(0) @binding(0)
var<uniform> params: TrailParams;

@fragment
fn fs_main() -> @location(0) vec4<f32> {{
    return vec4<f32>(0.0, 0.0, 0.0, params.fade_alpha);
}}
"#,
        fullscreen = FULLSCREEN_WGSL,
        params = TRAIL_PARAMS_WGSL,
    )
}

fn generate_trail_shader() -> String {
    format!(
        r#"{utils}
{params}
@group(0) @binding(0)
var<uniform> params: TrailParams;

@group(0) @binding(1)
var prev_state: texture_2d<f32>;

@group(0) @binding(2)
var cur_state: texture_2d<f32>;

struct TrailOut {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
}};

fn state_coords(linear: u32) -> vec2<u32> {{
    return vec2<u32>(linear % params.state_side, linear / params.state_side);
}}

@vertex
fn vs_trail(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) particle: u32,
) -> TrailOut {{
    var out: TrailOut;
    out.color = params.color;
    // Degenerate point
    out.clip_position = vec4<f32>(0.0, 0.0, 0.0, 1.0);

    if particle >= params.particle_count {{
        return out;
    }}

    let pos_coords = state_coords(particle * 2u);
    let age_coords = state_coords(particle * 2u + 1u);
    let prev_age = unpack_age(textureLoad(prev_state, age_coords, 0));
    let cur_age = unpack_age(textureLoad(cur_state, age_coords, 0));
    if prev_age == AGE_SENTINEL || cur_age == AGE_SENTINEL || cur_age != prev_age + 1u {{
        return out;
    }}

    let a = unpack_position(textureLoad(prev_state, pos_coords, 0));
    let b = unpack_position(textureLoad(cur_state, pos_coords, 0));
    let d = b - a;
    let len = length(d);
    if len <= 0.0 {{
        return out;
    }}

    let n = vec2<f32>(-d.y, d.x) / len * params.half_width;
    var corners = array<vec2<f32>, 6>(a - n, a + n, b - n, b - n, a + n, b + n);
    let ndc = corners[vertex_index] / params.view_size * 2.0 - vec2<f32>(1.0);
    out.clip_position = vec4<f32>(ndc.x, -ndc.y, 0.0, 1.0);
    return out;
}}

@fragment
fn fs_main(in: TrailOut) -> @location(0) vec4<f32> {{
    return in.color;
}}
"#,
        utils = shader_utils::all_utils_wgsl(),
        params = TRAIL_PARAMS_WGSL,
    )
}

fn generate_composite_shader() -> String {
    format!(
        r#"{fullscreen}
@group(0) @binding(0)
var accumulation: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {{
    return textureLoad(accumulation, vec2<u32>(floor(frag.xy)), 0);
}}
"#,
        fullscreen = FULLSCREEN_WGSL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::validate_wgsl;

    // ========== Quad Tests ==========

    #[test]
    fn test_quad_straddles_segment() {
        let quad = trail_quad(Vec2::new(0.0, 0.0), 4, Vec2::new(4.0, 0.0), 5, 0.5).unwrap();
        assert_eq!(quad[0], Vec2::new(0.0, -0.5));
        assert_eq!(quad[1], Vec2::new(0.0, 0.5));
        assert_eq!(quad[2], Vec2::new(4.0, -0.5));
        assert_eq!(quad[5], Vec2::new(4.0, 0.5));
        assert_eq!(quad[2], quad[3]);
        assert_eq!(quad[1], quad[4]);
    }

    #[test]
    fn test_quad_width_is_independent_of_direction() {
        let quad = trail_quad(Vec2::new(10.0, 10.0), 0, Vec2::new(13.0, 14.0), 1, 1.5).unwrap();
        assert!((quad[0].distance(quad[1]) - 3.0).abs() < 1e-5);
        assert!((quad[2].distance(quad[5]) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_quad_collapses_for_dead_endpoints() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(2.0, 1.0);
        assert!(trail_quad(a, AGE_SENTINEL, b, 3, 0.5).is_none());
        assert!(trail_quad(a, 3, b, AGE_SENTINEL, 0.5).is_none());
        // natural respawn: 90 -> 0
        assert!(trail_quad(a, 90, b, 0, 0.5).is_none());
        // sentinel initialization: 127 -> hashed age
        assert!(trail_quad(a, AGE_SENTINEL, b, 40, 0.5).is_none());
        assert!(trail_quad(a, 3, a, 4, 0.5).is_none());
    }

    #[test]
    fn test_ndc_flips_y() {
        let size = Vec2::new(200.0, 100.0);
        assert_eq!(to_ndc(Vec2::ZERO, size), Vec2::new(-1.0, 1.0));
        assert_eq!(to_ndc(size, size), Vec2::new(1.0, -1.0));
        assert_eq!(to_ndc(Vec2::new(100.0, 50.0), size), Vec2::ZERO);
    }

    #[test]
    fn test_config_builders_clamp() {
        let config = TrailConfig::new()
            .with_half_width(-1.0)
            .with_fade_alpha(2.0)
            .with_color(ColorStyle::grey(255));
        assert_eq!(config.half_width, 0.0);
        assert_eq!(config.fade_alpha, 1.0);
        assert_eq!(config.color, ColorStyle::grey(255).to_unorm());
    }

    // ========== Shader Tests ==========

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<TrailParams>(), 48);
    }

    #[test]
    fn test_fade_shader_validates() {
        validate_wgsl(&generate_fade_shader()).expect("fade WGSL should be valid");
    }

    #[test]
    fn test_trail_shader_validates() {
        validate_wgsl(&generate_trail_shader()).expect("trail WGSL should be valid");
    }

    #[test]
    fn test_composite_shader_validates() {
        validate_wgsl(&generate_composite_shader()).expect("composite WGSL should be valid");
    }
}
