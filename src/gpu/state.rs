//! Particle state texture layout.
//!
//! Each particle owns two consecutive texels of a square RGBA8 texture: an
//! even texel with its packed position and an odd texel with its packed age.
//! Texels are addressed row-major, so linear index `i` sits at
//! `(i % side, i / side)`.

use crate::advector::Particle;
use crate::codec::{self, AGE_SENTINEL};

/// Size of a state texture and the particles it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateLayout {
    side: u32,
    particles: u32,
}

impl StateLayout {
    /// Smallest square texture holding `particles` texel pairs.
    pub fn for_particles(particles: u32) -> Self {
        let texels = particles.max(1) as u64 * 2;
        let mut side = (texels as f64).sqrt().ceil() as u32;
        while (side as u64) * (side as u64) < texels {
            side += 1;
        }
        Self { side, particles }
    }

    /// Edge length of the texture.
    #[inline]
    pub fn side(&self) -> u32 {
        self.side
    }

    /// Particles stored.
    #[inline]
    pub fn particle_count(&self) -> u32 {
        self.particles
    }

    /// Texels in the texture, including padding.
    #[inline]
    pub fn texel_count(&self) -> u32 {
        self.side * self.side
    }

    /// Texture coordinates of a linear texel index.
    #[inline]
    pub fn texel_of(&self, linear: u32) -> (u32, u32) {
        (linear % self.side, linear / self.side)
    }

    /// Linear index of a texel.
    #[inline]
    pub fn linear_of(&self, x: u32, y: u32) -> u32 {
        y * self.side + x
    }

    /// Texel holding a particle's position.
    #[inline]
    pub fn position_texel(&self, particle: u32) -> (u32, u32) {
        self.texel_of(particle * 2)
    }

    /// Texel holding a particle's age.
    #[inline]
    pub fn age_texel(&self, particle: u32) -> (u32, u32) {
        self.texel_of(particle * 2 + 1)
    }
}

/// CPU copy of a particle state texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateImage {
    layout: StateLayout,
    bytes: Vec<u8>,
}

impl StateImage {
    /// Every particle at the origin with the "needs init" age.
    pub fn uninitialized(layout: StateLayout) -> Self {
        let mut image = Self {
            layout,
            bytes: vec![0; layout.texel_count() as usize * 4],
        };
        for i in 0..layout.particle_count() {
            image.set_particle(i, 0.0, 0.0, AGE_SENTINEL);
        }
        image
    }

    /// Seed from CPU particles; extra slots are left uninitialized.
    pub fn from_particles(layout: StateLayout, particles: &[Particle]) -> Self {
        let mut image = Self::uninitialized(layout);
        for (i, p) in particles.iter().take(layout.particle_count() as usize).enumerate() {
            image.set_particle(i as u32, p.x, p.y, p.age);
        }
        image
    }

    /// Wrap bytes read back from a texture.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` does not match the layout's size.
    pub fn from_bytes(layout: StateLayout, bytes: Vec<u8>) -> Self {
        assert_eq!(
            bytes.len(),
            layout.texel_count() as usize * 4,
            "State bytes do not match a {}x{} texture",
            layout.side(),
            layout.side()
        );
        Self { layout, bytes }
    }

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    /// Tightly packed RGBA8 rows.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes of one texel.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let off = self.layout.linear_of(x, y) as usize * 4;
        [self.bytes[off], self.bytes[off + 1], self.bytes[off + 2], self.bytes[off + 3]]
    }

    /// Overwrite one texel.
    #[inline]
    pub fn set_texel(&mut self, x: u32, y: u32, texel: [u8; 4]) {
        let off = self.layout.linear_of(x, y) as usize * 4;
        self.bytes[off..off + 4].copy_from_slice(&texel);
    }

    /// Decode `(x, y, age)` of a particle.
    pub fn particle(&self, index: u32) -> (f32, f32, u32) {
        let (px, py) = self.layout.position_texel(index);
        let (ax, ay) = self.layout.age_texel(index);
        let (x, y) = codec::unpack_position_bytes(self.texel(px, py));
        (x, y, codec::unpack_age_bytes(self.texel(ax, ay)))
    }

    /// Encode a particle into its texel pair.
    pub fn set_particle(&mut self, index: u32, x: f32, y: f32, age: u32) {
        let (px, py) = self.layout.position_texel(index);
        let (ax, ay) = self.layout.age_texel(index);
        self.set_texel(px, py, codec::pack_position_bytes(x, y));
        self.set_texel(ax, ay, codec::pack_age_bytes(age));
    }

    /// Whether a particle is waiting for (re)initialization.
    pub fn needs_init(&self, index: u32) -> bool {
        self.particle(index).2 == AGE_SENTINEL
    }
}
