//! Render-to-texture particle evolution.
//!
//! Two state textures form a ping-pong pair. Each [`ParticleEvolver::evolve`]
//! draws a fullscreen triangle into the non-current texture while reading the
//! current one and the field texture, then swaps. The fragment shader is the
//! WGSL form of [`kernel::evolve_texel`](super::kernel::evolve_texel).

use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::error::GpuError;
use crate::shader_utils;

use super::field_texture::FieldTexture;
use super::kernel::EvolveParams;
use super::ping_pong::PingPong;
use super::state::{StateImage, StateLayout};
use super::{create_pipeline, texture_entry, uniform_entry, GpuContext, FULLSCREEN_WGSL};

/// One state texture and its view.
pub struct StateTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// GPU particle evolver.
pub struct ParticleEvolver {
    layout: StateLayout,
    params: EvolveParams,
    state: PingPong<StateTarget>,
    field_view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    /// `bind_groups[i]` reads state texture `i`.
    bind_groups: [wgpu::BindGroup; 2],
    params_buffer: wgpu::Buffer,
}

impl ParticleEvolver {
    /// Allocate state textures with every particle awaiting initialization.
    pub fn new(
        ctx: &GpuContext,
        layout: StateLayout,
        field: &FieldTexture,
        seed: u32,
    ) -> Result<Self, GpuError> {
        let params = EvolveParams::new(layout, field, seed);

        let initial = StateImage::uninitialized(layout);
        let make_target = |label: &str| -> Result<StateTarget, GpuError> {
            let texture = ctx.create_texture(
                label,
                layout.side(),
                layout.side(),
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
            )?;
            ctx.write_texture(&texture, layout.side(), layout.side(), initial.as_bytes());
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Ok(StateTarget { texture, view })
        };
        let state = PingPong::new(
            make_target("Particle State A")?,
            make_target("Particle State B")?,
        );

        let field_view = field
            .upload(ctx)?
            .create_view(&wgpu::TextureViewDescriptor::default());

        ctx.push_validation_scope();
        let params_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Evolve Params Buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Evolve Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_evolve_shader().into()),
        });

        let bind_group_layout =
            ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Evolve Bind Group Layout"),
                entries: &[
                    uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                    texture_entry(1, wgpu::ShaderStages::FRAGMENT),
                    texture_entry(2, wgpu::ShaderStages::FRAGMENT),
                ],
            });

        let pipeline = create_pipeline(
            &ctx.device,
            "Evolve Pipeline",
            &bind_group_layout,
            &shader,
            "vs_fullscreen",
            None,
        );

        let bind_groups =
            create_bind_groups(ctx, &bind_group_layout, &params_buffer, &state, &field_view);

        ctx.pop_validation_scope()?;
        info!(
            "Particle evolver created: {} particles in {}x{} state textures",
            layout.particle_count(),
            layout.side(),
            layout.side()
        );

        Ok(Self {
            layout,
            params,
            state,
            field_view,
            pipeline,
            bind_group_layout,
            bind_groups,
            params_buffer,
        })
    }

    /// Swap in a rebuilt field. Particles keep their state.
    pub fn set_field(&mut self, ctx: &GpuContext, field: &FieldTexture) -> Result<(), GpuError> {
        self.params.retarget(field);
        self.field_view = field
            .upload(ctx)?
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_groups = create_bind_groups(
            ctx,
            &self.bind_group_layout,
            &self.params_buffer,
            &self.state,
            &self.field_view,
        );
        debug!("Evolver field replaced");
        Ok(())
    }

    /// Overwrite the current state, e.g. with CPU particles.
    pub fn seed_state(&self, ctx: &GpuContext, image: &StateImage) {
        ctx.write_texture(
            &self.state.current().texture,
            self.layout.side(),
            self.layout.side(),
            image.as_bytes(),
        );
    }

    /// Run one evolve pass and swap.
    pub fn evolve(&mut self, ctx: &GpuContext) {
        ctx.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));

        let read_index = self.state.current_index();
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Evolve Encoder"),
        });
        {
            let (_, write) = self.state.split();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Evolve Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &write.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[read_index], &[]);
            pass.draw(0..3, 0..1);
        }
        ctx.queue.submit(Some(encoder.finish()));

        self.state.swap();
        self.params.frame = self.params.frame.wrapping_add(1);
    }

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    pub fn params(&self) -> &EvolveParams {
        &self.params
    }

    /// Index of the current state texture.
    pub fn current_index(&self) -> usize {
        self.state.current_index()
    }

    /// State written by the last pass.
    pub fn current_view(&self) -> &wgpu::TextureView {
        &self.state.current().view
    }

    /// State before the last pass.
    pub fn previous_view(&self) -> &wgpu::TextureView {
        &self.state.previous().view
    }

    /// Read the current state back to the CPU.
    pub fn read_state(&self, ctx: &GpuContext) -> Result<StateImage, GpuError> {
        let side = self.layout.side();
        let bytes = ctx.read_texture(&self.state.current().texture, side, side)?;
        Ok(StateImage::from_bytes(self.layout, bytes))
    }
}

fn create_bind_groups(
    ctx: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    params_buffer: &wgpu::Buffer,
    state: &PingPong<StateTarget>,
    field_view: &wgpu::TextureView,
) -> [wgpu::BindGroup; 2] {
    state.both().each_ref().map(|target| {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Evolve Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(field_view),
                },
            ],
        })
    })
}

/// WGSL of the evolve pass.
pub fn generate_evolve_shader() -> String {
    format!(
        r#"{utils}
{fullscreen}
struct EvolveParams {{
    seed: u32,
    frame: u32,
    particle_count: u32,
    state_side: u32,
    field_origin: vec2<f32>,
    field_extent: vec2<f32>,
    field_size: vec2<u32>,
    natural_respawn_age: u32,
    _pad: u32,
}};

@group(0) @binding(0)
var<uniform> params: EvolveParams;

@group(0) @binding(1)
var state_tex: texture_2d<f32>;

@group(0) @binding(2)
var field_tex: texture_2d<f32>;

fn state_texel(linear: u32) -> vec4<f32> {{
    let coords = vec2<u32>(linear % params.state_side, linear / params.state_side);
    return textureLoad(state_tex, coords, 0);
}}

// Field is stored transposed: logical (x, y) lives at texel (y, x)
fn wind_at(pos: vec2<f32>) -> vec3<f32> {{
    let local = floor(pos - params.field_origin + vec2<f32>(0.5));
    if local.x < 0.0 || local.y < 0.0 || local.x >= f32(params.field_size.x) || local.y >= f32(params.field_size.y) {{
        return vec3<f32>(0.0, 0.0, -1.0);
    }}
    return unpack_wind(textureLoad(field_tex, vec2<u32>(u32(local.y), u32(local.x)), 0));
}}

fn spawn(particle: u32) -> vec2<f32> {{
    let r = vec2<f32>(
        particle_rand(params.seed, params.frame, particle, 0u),
        particle_rand(params.seed, params.frame, particle, 1u)
    );
    return params.field_origin + r * params.field_extent;
}}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {{
    let coords = vec2<u32>(floor(frag.xy));
    let linear = coords.y * params.state_side + coords.x;
    let particle = linear / 2u;
    if particle >= params.particle_count {{
        return vec4<f32>(0.0);
    }}

    let pos = unpack_position(state_texel(particle * 2u));
    let age = unpack_age(state_texel(particle * 2u + 1u));

    var next_pos = pos;
    var next_age = age + 1u;
    if age == AGE_SENTINEL {{
        next_pos = spawn(particle);
        let r = particle_rand(params.seed, params.frame, particle, 2u);
        next_age = min(u32(floor(r * f32(params.natural_respawn_age))), params.natural_respawn_age - 1u);
    }} else if age >= params.natural_respawn_age {{
        next_pos = spawn(particle);
        next_age = 0u;
    }} else {{
        let wind = wind_at(pos);
        if wind.z < 0.0 {{
            next_age = AGE_SENTINEL;
        }} else {{
            let dest = pos + wind.xy;
            if wind_at(dest).z < 0.0 {{
                next_age = AGE_SENTINEL;
            }} else {{
                next_pos = dest;
            }}
        }}
    }}

    if (linear & 1u) == 0u {{
        return pack_position(next_pos);
    }}
    return pack_age(next_age);
}}
"#,
        utils = shader_utils::all_utils_wgsl(),
        fullscreen = FULLSCREEN_WGSL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_support::validate_wgsl;

    #[test]
    fn test_evolve_shader_validates() {
        let shader = generate_evolve_shader();
        validate_wgsl(&shader).expect("evolve WGSL should be valid");
    }

    #[test]
    fn test_evolve_shader_matches_params_layout() {
        assert_eq!(std::mem::size_of::<EvolveParams>(), 48);
        let shader = generate_evolve_shader();
        assert!(shader.contains("natural_respawn_age: u32"));
        assert!(shader.contains("texel (y, x)"));
    }
}
