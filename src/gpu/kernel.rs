//! The per-texel evolve rule, in Rust.
//!
//! [`evolve_texel`] computes exactly what the evolver's fragment shader writes
//! for one texel, and [`SoftwareEvolver`] applies it to a whole
//! [`StateImage`]. Both texels of a particle run the same decision and differ
//! only in which half of the result they write.
//!
//! Per particle:
//!
//! 1. Age is the sentinel: initialize at a hashed position inside the field
//!    extent with a hashed age in `[0, natural_respawn_age)`.
//! 2. Age reached `natural_respawn_age`: respawn at a hashed position, age 0.
//! 3. No wind under the particle, or none at its destination: write the
//!    sentinel so the next pass reinitializes it.
//! 4. Otherwise move by the wind and age by one.
//!
//! Step 3 differs from the CPU advector, which moves a particle with an
//! undefined destination without drawing it.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::codec::{self, AGE_SENTINEL};
use crate::spawn::{particle_rand, spawn_point};

use super::field_texture::FieldTexture;
use super::ping_pong::PingPong;
use super::state::{StateImage, StateLayout};

/// Age at which a GPU particle respawns on its own.
pub const NATURAL_RESPAWN_AGE: u32 = 90;

/// Uniforms of the evolve pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct EvolveParams {
    pub seed: u32,
    pub frame: u32,
    pub particle_count: u32,
    pub state_side: u32,
    /// Screen position of the field's first sample.
    pub field_origin: [f32; 2],
    /// Size of the spawn rectangle in pixels.
    pub field_extent: [f32; 2],
    /// Logical `(width, height)` of the field.
    pub field_size: [u32; 2],
    pub natural_respawn_age: u32,
    pub _pad: u32,
}

impl EvolveParams {
    /// Parameters for a state layout over a field.
    pub fn new(layout: StateLayout, field: &FieldTexture, seed: u32) -> Self {
        let (w, h) = field.logical_size();
        Self {
            seed,
            frame: 0,
            particle_count: layout.particle_count(),
            state_side: layout.side(),
            field_origin: field.origin().to_array(),
            field_extent: [w as f32, h as f32],
            field_size: [w, h],
            natural_respawn_age: NATURAL_RESPAWN_AGE,
            _pad: 0,
        }
    }

    /// Override the natural respawn age (1..=126, below the sentinel).
    pub fn with_natural_respawn_age(mut self, age: u32) -> Self {
        self.natural_respawn_age = age.clamp(1, AGE_SENTINEL - 1);
        self
    }

    /// Point the parameters at a new field, keeping seed and frame.
    pub fn retarget(&mut self, field: &FieldTexture) {
        let (w, h) = field.logical_size();
        self.field_origin = field.origin().to_array();
        self.field_extent = [w as f32, h as f32];
        self.field_size = [w, h];
    }

    /// Hashed spawn point of `particle` this frame.
    pub fn spawn(&self, particle: u32) -> Vec2 {
        spawn_point(
            particle_rand(self.seed, self.frame, particle, 0),
            particle_rand(self.seed, self.frame, particle, 1),
            Vec2::from(self.field_origin),
            Vec2::from(self.field_extent),
        )
    }

    /// Hashed initial age of `particle` this frame.
    pub fn initial_age(&self, particle: u32) -> u32 {
        let r = particle_rand(self.seed, self.frame, particle, 2);
        ((r * self.natural_respawn_age as f32).floor() as u32).min(self.natural_respawn_age - 1)
    }
}

/// Next `(position, age)` of a particle.
pub fn evolve_particle(
    params: &EvolveParams,
    field: &FieldTexture,
    particle: u32,
    pos: Vec2,
    age: u32,
) -> (Vec2, u32) {
    if age == AGE_SENTINEL {
        return (params.spawn(particle), params.initial_age(particle));
    }
    if age >= params.natural_respawn_age {
        return (params.spawn(particle), 0);
    }
    let wind = field.wind_at(pos);
    if !wind.is_valid() {
        return (pos, AGE_SENTINEL);
    }
    let dest = pos + Vec2::new(wind.u, wind.v);
    if !field.wind_at(dest).is_valid() {
        return (pos, AGE_SENTINEL);
    }
    (dest, age + 1)
}

/// Bytes the evolve pass writes at texel `(x, y)`.
pub fn evolve_texel(
    params: &EvolveParams,
    read: &StateImage,
    field: &FieldTexture,
    x: u32,
    y: u32,
) -> [u8; 4] {
    let layout = read.layout();
    let linear = layout.linear_of(x, y);
    let particle = linear / 2;
    if particle >= params.particle_count {
        return [0; 4];
    }
    let (px, py, age) = read.particle(particle);
    let (pos, age) = evolve_particle(params, field, particle, Vec2::new(px, py), age);
    if linear % 2 == 0 {
        codec::pack_position_bytes(pos.x, pos.y)
    } else {
        codec::pack_age_bytes(age)
    }
}

/// CPU stand-in for [`ParticleEvolver`](super::ParticleEvolver).
pub struct SoftwareEvolver {
    params: EvolveParams,
    state: PingPong<StateImage>,
}

impl SoftwareEvolver {
    /// Start with every particle waiting for initialization.
    pub fn new(layout: StateLayout, field: &FieldTexture, seed: u32) -> Self {
        Self::with_params(layout, EvolveParams::new(layout, field, seed))
    }

    /// Start with explicit parameters.
    pub fn with_params(layout: StateLayout, params: EvolveParams) -> Self {
        Self {
            params,
            state: PingPong::new(
                StateImage::uninitialized(layout),
                StateImage::uninitialized(layout),
            ),
        }
    }

    pub fn params(&self) -> &EvolveParams {
        &self.params
    }

    /// Replace the current state, e.g. with particles from the CPU path.
    pub fn seed_state(&mut self, image: StateImage) {
        *self.state.current_mut() = image;
    }

    /// Run one pass over every texel, then swap.
    pub fn step(&mut self, field: &FieldTexture) {
        {
            let (read, mut write) = self.state.split();
            let side = read.layout().side();
            for y in 0..side {
                for x in 0..side {
                    let texel = evolve_texel(&self.params, &read, field, x, y);
                    write.set_texel(x, y, texel);
                }
            }
        }
        self.state.swap();
        self.params.frame = self.params.frame.wrapping_add(1);
    }

    /// State after the last pass.
    pub fn current(&self) -> &StateImage {
        self.state.current()
    }

    /// State before the last pass.
    pub fn previous(&self) -> &StateImage {
        self.state.previous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::Distortion;
    use crate::field::{Bounds, FieldConfig};
    use crate::gpu::field_texture::encode_field_texture;
    use crate::grid::RegularGrid;
    use crate::projection::Projection;

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

    fn east_wind_texture(mask_x_max: i32) -> FieldTexture {
        let grid = RegularGrid::uniform(4, 4, 0.0, 99.0, 33.0, 33.0, 2.0, 0.0);
        let mask = move |x: i32, y: i32| x < mask_x_max && (0..100).contains(&y);
        let config = FieldConfig::new().without_seam_guard();
        encode_field_texture(&Identity, &grid, &mask, Bounds::new(0, 0, 99, 99), &config).unwrap()
    }

    // ========== Rule Tests ==========

    #[test]
    fn test_sentinel_initializes_inside_extent() {
        let field = east_wind_texture(100);
        let params = EvolveParams::new(StateLayout::for_particles(64), &field, 11);
        for i in 0..64 {
            let (pos, age) = evolve_particle(&params, &field, i, Vec2::ZERO, AGE_SENTINEL);
            assert!(pos.x >= 0.0 && pos.x <= 100.0 && pos.y >= 0.0 && pos.y <= 100.0);
            assert!(age < NATURAL_RESPAWN_AGE);
            assert_eq!(pos, params.spawn(i));
        }
    }

    #[test]
    fn test_natural_respawn_resets_age_to_zero() {
        let field = east_wind_texture(100);
        let params = EvolveParams::new(StateLayout::for_particles(1), &field, 11);
        let pos = Vec2::new(10.0, 10.0);
        let (_, age) = evolve_particle(&params, &field, 0, pos, NATURAL_RESPAWN_AGE);
        assert_eq!(age, 0);
        let (_, age) = evolve_particle(&params, &field, 0, pos, NATURAL_RESPAWN_AGE - 1);
        assert_eq!(age, NATURAL_RESPAWN_AGE);
    }

    #[test]
    fn test_valid_step_moves_and_ages() {
        let field = east_wind_texture(100);
        let params = EvolveParams::new(StateLayout::for_particles(1), &field, 11);
        let (pos, age) = evolve_particle(&params, &field, 0, Vec2::new(10.0, 10.0), 5);
        assert_eq!(pos, Vec2::new(12.0, 10.0));
        assert_eq!(age, 6);
    }

    #[test]
    fn test_invalid_here_writes_sentinel() {
        let field = east_wind_texture(50);
        let params = EvolveParams::new(StateLayout::for_particles(1), &field, 11);
        let (pos, age) = evolve_particle(&params, &field, 0, Vec2::new(70.0, 10.0), 5);
        assert_eq!(age, AGE_SENTINEL);
        assert_eq!(pos, Vec2::new(70.0, 10.0));
    }

    #[test]
    fn test_invalid_destination_writes_sentinel() {
        // The CPU advector would move this particle silently instead
        let field = east_wind_texture(50);
        let params = EvolveParams::new(StateLayout::for_particles(1), &field, 11);
        let (_, age) = evolve_particle(&params, &field, 0, Vec2::new(49.0, 10.0), 5);
        assert_eq!(age, AGE_SENTINEL);
    }

    // ========== Software Evolver Tests ==========

    #[test]
    fn test_first_pass_initializes_everything() {
        let field = east_wind_texture(100);
        let layout = StateLayout::for_particles(10);
        let mut evolver = SoftwareEvolver::new(layout, &field, 3);
        let spawn_params = *evolver.params();
        evolver.step(&field);

        for i in 0..10 {
            let (x, y, age) = evolver.current().particle(i);
            assert_ne!(age, AGE_SENTINEL);
            let expected = spawn_params.spawn(i);
            assert!((x - expected.x).abs() <= 1.0 / 16.0);
            assert!((y - expected.y).abs() <= 1.0 / 16.0);
            assert!(evolver.previous().needs_init(i));
        }
        assert_eq!(evolver.params().frame, 1);
    }

    #[test]
    fn test_padding_texels_stay_zero() {
        let field = east_wind_texture(100);
        let layout = StateLayout::for_particles(3);
        let mut evolver = SoftwareEvolver::new(layout, &field, 3);
        evolver.step(&field);
        // 3 particles use texels 0..6 of a 3x3 texture
        assert_eq!(evolver.current().texel(0, 2), [0; 4]);
        assert_eq!(evolver.current().texel(2, 2), [0; 4]);
    }

    #[test]
    fn test_seeded_state_advances() {
        let field = east_wind_texture(100);
        let layout = StateLayout::for_particles(1);
        let mut evolver = SoftwareEvolver::new(layout, &field, 3);
        let mut image = StateImage::uninitialized(layout);
        image.set_particle(0, 20.0, 30.0, 0);
        evolver.seed_state(image);
        evolver.step(&field);
        evolver.step(&field);
        assert_eq!(evolver.current().particle(0), (24.0, 30.0, 2));
        assert_eq!(evolver.previous().particle(0), (22.0, 30.0, 1));
    }
}
