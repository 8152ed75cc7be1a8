//! Particle spawning.
//!
//! The CPU path normally draws spawn points uniformly from a dense field's
//! valid positions using a seeded [`SmallRng`]. The GPU path cannot keep RNG
//! state per texel, so it derives its random values from an integer hash of
//! `(seed, frame, particle)`. [`Spawner::hashed`] puts the CPU path on that
//! same hash so both paths place a given particle at the same point.

use glam::Vec2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::advector::Particle;
use crate::field::DenseField;

/// Which particle is spawning, and on which tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpawnSlot {
    /// Index of the particle in its pool.
    pub particle: u32,
    /// Tick counter of the pool.
    pub frame: u32,
}

impl SpawnSlot {
    pub fn new(particle: u32, frame: u32) -> Self {
        Self { particle, frame }
    }
}

enum Source {
    Rng(SmallRng),
    Hashed { seed: u32 },
}

/// Source of spawn points and ages for the CPU path.
pub struct Spawner {
    source: Source,
}

impl Spawner {
    /// Reproducible spawner over the valid positions.
    pub fn seeded(seed: u64) -> Self {
        Self {
            source: Source::Rng(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Spawner seeded from the OS.
    pub fn from_entropy() -> Self {
        Self {
            source: Source::Rng(SmallRng::from_entropy()),
        }
    }

    /// Spawner that hashes `(seed, frame, particle)` like the GPU evolver.
    ///
    /// Points are spread over the whole field rectangle, not just the valid
    /// positions. A particle landing on an undefined pixel is retired by the
    /// advection rule and spawns again on a later tick.
    pub fn hashed(seed: u32) -> Self {
        Self {
            source: Source::Hashed { seed },
        }
    }

    /// Whether this spawner follows the GPU hash.
    pub fn is_hashed(&self) -> bool {
        matches!(self.source, Source::Hashed { .. })
    }

    /// Age in `[0, max_age)`, or 0 when `max_age` is 0.
    pub fn age(&mut self, max_age: u32, slot: SpawnSlot) -> u32 {
        if max_age == 0 {
            return 0;
        }
        match &mut self.source {
            Source::Rng(rng) => rng.gen_range(0..max_age),
            Source::Hashed { seed } => {
                let r = particle_rand(*seed, slot.frame, slot.particle, 2);
                ((r * max_age as f32).floor() as u32).min(max_age - 1)
            }
        }
    }

    fn position(&mut self, field: &DenseField, slot: SpawnSlot) -> Option<Vec2> {
        match &mut self.source {
            Source::Rng(rng) => {
                let [x, y] = field.random_valid(rng)?;
                Some(Vec2::new(x as f32, y as f32))
            }
            Source::Hashed { seed } => {
                if field.is_empty() {
                    return None;
                }
                let b = field.bounds()?;
                let origin = Vec2::new(b.x as f32, b.y as f32);
                let extent = Vec2::new(b.width as f32, b.height as f32);
                Some(hashed_spawn(*seed, slot.frame, slot.particle, origin, extent))
            }
        }
    }

    /// A particle at a spawn point with an age below `max_age`.
    ///
    /// Returns `None` when the field has nowhere to spawn.
    pub fn randomize(
        &mut self,
        field: &DenseField,
        max_age: u32,
        slot: SpawnSlot,
    ) -> Option<Particle> {
        let p = self.position(field, slot)?;
        let age = self.age(max_age, slot);
        Some(Particle::new(p.x, p.y, age))
    }

    /// Move `particle` to a spawn point; its age is left alone.
    pub fn respawn(
        &mut self,
        field: &DenseField,
        particle: &mut Particle,
        slot: SpawnSlot,
    ) -> bool {
        match self.position(field, slot) {
            Some(p) => {
                particle.x = p.x;
                particle.y = p.y;
                particle.xt = None;
                particle.yt = None;
                true
            }
            None => false,
        }
    }
}

/// Hash a u32 to a pseudo-random u32. Matches `hash` in the WGSL utilities.
#[inline]
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Hash three values. Matches `hash3` in the WGSL utilities.
#[inline]
pub fn hash3(a: u32, b: u32, c: u32) -> u32 {
    hash(a.wrapping_add(hash(b.wrapping_add(hash(c)))))
}

/// Random float in `[0, 1]` from a seed. Matches `rand` in the WGSL utilities.
#[inline]
pub fn hash_rand(seed: u32) -> f32 {
    hash(seed) as f32 / 4_294_967_295.0
}

/// Random value for one `channel` of `particle` at `frame`.
///
/// Channel 0 and 1 are the spawn x/y, channel 2 the initial age.
#[inline]
pub fn particle_rand(seed: u32, frame: u32, particle: u32, channel: u32) -> f32 {
    hash_rand(hash3(particle, frame, seed.wrapping_add(channel.wrapping_mul(0x9e37_79b9))))
}

/// Map two random values in `[0, 1]` onto a rectangle.
#[inline]
pub fn spawn_point(r0: f32, r1: f32, origin: Vec2, extent: Vec2) -> Vec2 {
    origin + Vec2::new(r0, r1) * extent
}

/// Spawn point the GPU evolver would choose for `particle` at `frame`.
pub fn hashed_spawn(seed: u32, frame: u32, particle: u32, origin: Vec2, extent: Vec2) -> Vec2 {
    spawn_point(
        particle_rand(seed, frame, particle, 0),
        particle_rand(seed, frame, particle, 1),
        origin,
        extent,
    )
}
