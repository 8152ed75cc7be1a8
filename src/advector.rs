//! CPU particle advection.
//!
//! Each tick every particle looks up the dense field at its position, takes
//! one step, and, if both ends of the step have data, contributes a line
//! segment to the color bucket of its intensity. Trails are not tracked: they
//! emerge from the renderer fading the previous frame before drawing.
//!
//! Per-particle rule, in order:
//!
//! 1. `age > max_age`: respawn at a spawn point with a fresh age.
//! 2. No data under the particle: force `age = max_age` so it respawns next
//!    tick instead of teleporting now.
//! 3. Otherwise step to `(x + u, y + v)`. With data at the destination the
//!    segment is drawn; without it the particle moves silently.
//! 4. `age += 1`.

use glam::Vec2;

use crate::field::{Bounds, DenseField};
use crate::spawn::{SpawnSlot, Spawner};
use crate::visuals::{ColorBuckets, ColorStyle};

/// Ticks a particle lives before it respawns.
pub const MAX_PARTICLE_AGE: u32 = 100;

/// A single particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// Ticks since (re)spawn.
    pub age: u32,
    /// Current screen x.
    pub x: f32,
    /// Current screen y.
    pub y: f32,
    /// Tentative next x, set while a visible segment awaits rendering.
    pub xt: Option<f32>,
    /// Tentative next y.
    pub yt: Option<f32>,
}

impl Particle {
    /// A particle at rest at `(x, y)`.
    pub fn new(x: f32, y: f32, age: u32) -> Self {
        Self {
            age,
            x,
            y,
            xt: None,
            yt: None,
        }
    }

    /// Current position.
    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Tentative next position, if one is pending.
    #[inline]
    pub fn target(&self) -> Option<Vec2> {
        Some(Vec2::new(self.xt?, self.yt?))
    }

    /// Copy the tentative position into the current one.
    #[inline]
    pub fn commit(&mut self) {
        if let Some(t) = self.target() {
            self.x = t.x;
            self.y = t.y;
        }
        self.xt = None;
        self.yt = None;
    }
}

/// Configuration for the CPU advector.
#[derive(Clone, Debug)]
pub struct AdvectorConfig {
    /// Ticks before respawn.
    pub max_particle_age: u32,
    /// Particles per pixel of visible width.
    pub particle_multiplier: f32,
    /// Factor applied to the pool size in reduced mode.
    pub particle_reduction: f32,
    /// Use the reduced pool size (small or slow devices).
    pub reduced: bool,
    /// Grey step of the intensity color scale.
    pub intensity_scale_step: u8,
}

impl AdvectorConfig {
    /// Default configuration.
    ///
    /// - `max_particle_age`: 100
    /// - `particle_multiplier`: 7 particles per pixel of width
    /// - `particle_reduction`: 0.75 (when `reduced`)
    /// - `intensity_scale_step`: 10
    pub fn new() -> Self {
        Self {
            max_particle_age: MAX_PARTICLE_AGE,
            particle_multiplier: 7.0,
            particle_reduction: 0.75,
            reduced: false,
            intensity_scale_step: 10,
        }
    }

    /// Set the respawn age (at least 1).
    pub fn with_max_age(mut self, age: u32) -> Self {
        self.max_particle_age = age.max(1);
        self
    }

    /// Set particles per pixel of visible width.
    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.particle_multiplier = multiplier.max(0.0);
        self
    }

    /// Enable the reduced pool size.
    pub fn reduced(mut self) -> Self {
        self.reduced = true;
        self
    }

    /// Pool size for the given bounds.
    pub fn particle_count(&self, bounds: &Bounds) -> usize {
        if bounds.is_degenerate() {
            return 0;
        }
        let mut count = bounds.width as f32 * self.particle_multiplier;
        if self.reduced {
            count *= self.particle_reduction;
        }
        count.round() as usize
    }
}

impl Default for AdvectorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A line from a particle's position to its next position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub from: Vec2,
    pub to: Vec2,
}

/// Everything a renderer needs for one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCommand {
    /// Segments grouped by color bucket; `buckets[i]` uses `styles[i]`.
    pub buckets: Vec<Vec<Segment>>,
    /// Stroke style per bucket.
    pub styles: Vec<ColorStyle>,
}

impl DrawCommand {
    /// Total number of segments.
    pub fn segment_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// Owns the particle pool and applies the advection rule.
pub struct Advector {
    config: AdvectorConfig,
    particles: Vec<Particle>,
    buckets: ColorBuckets,
    spawner: Spawner,
    /// Ticks applied so far.
    frame: u32,
}

impl Advector {
    /// Allocate a pool sized for `field` and scatter it over valid positions.
    pub fn new(
        config: AdvectorConfig,
        field: &DenseField,
        buckets: ColorBuckets,
        mut spawner: Spawner,
    ) -> Self {
        let count = field.bounds().map(|b| config.particle_count(&b)).unwrap_or(0);
        let particles = (0..count as u32)
            .filter_map(|i| spawner.randomize(field, config.max_particle_age, SpawnSlot::new(i, 0)))
            .collect();
        Self {
            config,
            particles,
            buckets,
            spawner,
            frame: 0,
        }
    }

    /// Use a caller-provided pool.
    pub fn with_particles(
        config: AdvectorConfig,
        particles: Vec<Particle>,
        buckets: ColorBuckets,
        spawner: Spawner,
    ) -> Self {
        Self {
            config,
            particles,
            buckets,
            spawner,
            frame: 0,
        }
    }

    /// The particle pool.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable access to the particle pool.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Color buckets used for grouping.
    pub fn buckets(&self) -> &ColorBuckets {
        &self.buckets
    }

    /// Swap the color scale, keeping the pool.
    pub fn set_buckets(&mut self, buckets: ColorBuckets) {
        self.buckets = buckets;
    }

    /// Configuration in use.
    pub fn config(&self) -> &AdvectorConfig {
        &self.config
    }

    /// Number of ticks applied.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// A fresh particle at a spawn point, as if appended to the pool.
    pub fn randomize(&mut self, field: &DenseField) -> Option<Particle> {
        let slot = SpawnSlot::new(self.particles.len() as u32, self.frame);
        self.spawner.randomize(field, self.config.max_particle_age, slot)
    }

    /// Apply one tick of the rule. Visible particles keep `xt`/`yt` set
    /// until [`commit`](Self::commit).
    pub fn evolve(&mut self, field: &DenseField) -> DrawCommand {
        let max_age = self.config.max_particle_age;
        let mut buckets = vec![Vec::new(); self.buckets.len()];

        for (i, particle) in self.particles.iter_mut().enumerate() {
            if particle.age > max_age {
                let slot = SpawnSlot::new(i as u32, self.frame);
                self.spawner.respawn(field, particle, slot);
                particle.age = self.spawner.age(max_age, slot);
            } else {
                let v = field.vector_at(particle.x, particle.y);
                match v.magnitude {
                    None => particle.age = max_age,
                    // Nothing to draw for a particle at rest
                    Some(_) if v.u == 0.0 && v.v == 0.0 => {}
                    Some(magnitude) => {
                        let xt = particle.x + v.u;
                        let yt = particle.y + v.v;
                        if field.is_defined(xt, yt) {
                            particle.xt = Some(xt);
                            particle.yt = Some(yt);
                            buckets[self.buckets.index_for(magnitude)].push(Segment {
                                from: particle.position(),
                                to: Vec2::new(xt, yt),
                            });
                        } else {
                            particle.x = xt;
                            particle.y = yt;
                        }
                    }
                }
            }
            particle.age += 1;
        }
        self.frame = self.frame.wrapping_add(1);

        DrawCommand {
            buckets,
            styles: self.buckets.styles().to_vec(),
        }
    }

    /// Move every particle with a pending segment to its tentative position.
    pub fn commit(&mut self) {
        for particle in &mut self.particles {
            particle.commit();
        }
    }

    /// Evolve and commit in one step.
    pub fn advance(&mut self, field: &DenseField) -> DrawCommand {
        let draw = self.evolve(field);
        self.commit();
        draw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Vector;

    fn uniform_field(u: f32, v: f32) -> DenseField {
        let mut field = DenseField::with_bounds(Bounds::new(0, 0, 49, 49));
        for x in 0..50 {
            for y in 0..50 {
                field.set(x, y, Vector::new(u, v, u.hypot(v)));
                field.push_valid(x, y);
            }
        }
        field
    }

    fn advector(particles: Vec<Particle>) -> Advector {
        Advector::with_particles(
            AdvectorConfig::new(),
            particles,
            ColorBuckets::intensity_scale(10, 17.0),
            Spawner::seeded(1),
        )
    }

    #[test]
    fn test_visible_step_is_bucketed() {
        let field = uniform_field(3.0, 4.0);
        let mut adv = advector(vec![Particle::new(10.0, 10.0, 0)]);
        let draw = adv.evolve(&field);

        let p = adv.particles()[0];
        assert_eq!((p.xt, p.yt), (Some(13.0), Some(14.0)));
        assert_eq!((p.x, p.y), (10.0, 10.0), "not committed until drawn");
        assert_eq!(p.age, 1);

        let bucket = adv.buckets().index_for(5.0);
        assert_eq!(draw.buckets[bucket].len(), 1);
        assert_eq!(draw.buckets[bucket][0].to, Vec2::new(13.0, 14.0));
        assert_eq!(draw.segment_count(), 1);

        adv.commit();
        assert_eq!(adv.particles()[0].position(), Vec2::new(13.0, 14.0));
        assert!(adv.particles()[0].target().is_none());
    }

    #[test]
    fn test_dead_field_forces_respawn_age() {
        let field = uniform_field(1.0, 0.0);
        let mut adv = advector(vec![Particle::new(80.0, 80.0, 3)]);
        let draw = adv.evolve(&field);
        assert_eq!(adv.particles()[0].age, MAX_PARTICLE_AGE + 1);
        assert_eq!(adv.particles()[0].position(), Vec2::new(80.0, 80.0));
        assert_eq!(draw.segment_count(), 0);

        // next tick respawns inside the field
        adv.evolve(&field);
        let p = adv.particles()[0];
        assert!(field.is_defined(p.x, p.y));
        assert!(p.age >= 1 && p.age <= MAX_PARTICLE_AGE);
    }

    #[test]
    fn test_undefined_destination_moves_without_drawing() {
        let field = uniform_field(5.0, 0.0);
        let mut adv = advector(vec![Particle::new(47.0, 10.0, 0)]);
        let draw = adv.evolve(&field);
        let p = adv.particles()[0];
        assert_eq!(draw.segment_count(), 0);
        assert_eq!(p.position(), Vec2::new(52.0, 10.0));
        assert!(p.target().is_none());
    }

    #[test]
    fn test_zero_field_never_moves() {
        let field = uniform_field(0.0, 0.0);
        let mut adv = advector(vec![Particle::new(20.0, 20.0, 0)]);
        for tick in 1..=10 {
            let draw = adv.advance(&field);
            let p = adv.particles()[0];
            assert_eq!(p.position(), Vec2::new(20.0, 20.0));
            assert!(p.target().is_none());
            assert_eq!(p.age, tick);
            assert_eq!(draw.segment_count(), 0);
        }
    }

    #[test]
    fn test_hashed_respawn_uses_index_and_frame() {
        let field = uniform_field(1.0, 0.0);
        let mut adv = Advector::with_particles(
            AdvectorConfig::new(),
            vec![Particle::new(5.0, 5.0, 0), Particle::new(5.0, 5.0, MAX_PARTICLE_AGE + 1)],
            ColorBuckets::intensity_scale(10, 17.0),
            Spawner::hashed(8),
        );
        adv.advance(&field);
        adv.particles_mut()[1].age = MAX_PARTICLE_AGE + 1;
        adv.advance(&field);
        assert_eq!(adv.frame(), 2);

        let extent = Vec2::new(50.0, 50.0);
        let expected = crate::spawn::hashed_spawn(8, 1, 1, Vec2::ZERO, extent);
        assert_eq!(adv.particles()[1].position(), expected);
        assert_ne!(expected, crate::spawn::hashed_spawn(8, 0, 1, Vec2::ZERO, extent));
    }

    #[test]
    fn test_pool_sized_from_bounds() {
        let field = uniform_field(1.0, 0.0);
        let adv = Advector::new(
            AdvectorConfig::new(),
            &field,
            ColorBuckets::intensity_scale(10, 17.0),
            Spawner::seeded(3),
        );
        assert_eq!(adv.particles().len(), 350);
        assert!(adv.particles().iter().all(|p| p.age < MAX_PARTICLE_AGE));

        let reduced = AdvectorConfig::new().reduced();
        assert_eq!(reduced.particle_count(&Bounds::new(0, 0, 49, 49)), 263);
    }

    #[test]
    fn test_empty_field_gives_empty_pool() {
        let adv = Advector::new(
            AdvectorConfig::new(),
            &DenseField::empty(),
            ColorBuckets::intensity_scale(10, 17.0),
            Spawner::seeded(3),
        );
        assert!(adv.particles().is_empty());
    }
}
