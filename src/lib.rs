//! # Windtrail - Vector Field Particle Advection
//!
//! Animated wind streaks over a projected map. A sparse geographic vector grid
//! is resampled into a dense per-pixel field for the current projection, and a
//! pool of particles is advanced through it every animation tick.
//!
//! Two interchangeable paths share that contract:
//!
//! - **CPU**: [`FieldEngine`] drives a [`FieldSampler`] scan and an
//!   [`Advector`] that emits colored line segments, rendered with fading by
//!   [`Canvas`].
//! - **GPU**: the field and particle state are packed into RGBA8 textures by
//!   the [`codec`] and evolved by render passes in [`gpu`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use windtrail::prelude::*;
//!
//! let projection: Arc<dyn Projection> = Arc::new(Orthographic::fit(800, 600, 0.0, 20.0));
//! let mask: Arc<dyn Mask> =
//!     Arc::new(VisibilityMask::from_projection(projection.as_ref(), 800, 600));
//! let bounds = Bounds::for_view(projection.as_ref(), 800, 600);
//! let grid: Arc<dyn VectorGrid> =
//!     Arc::new(RegularGrid::uniform(360, 181, 0.0, 90.0, 1.0, 1.0, 5.0, 0.0));
//!
//! let mut engine = FieldEngine::new(AdvectorConfig::new(), FieldConfig::new(), 7);
//! engine.rebuild(Some(projection), Some(grid), Some(mask), bounds, ResetPolicy::Reallocate);
//! engine.finish_scan();
//!
//! let mut canvas = Canvas::new(800, 600);
//! for _ in 0..60 {
//!     if let Some(draw) = engine.tick() {
//!         canvas.render(&draw, FADE_RETAIN);
//!     }
//! }
//! ```
//!
//! ## Undefined vectors
//!
//! Pixels outside the globe, where the grid has no data, or where the
//! projection is singular hold [`Vector::NULL`]. On the CPU path a particle
//! standing on one is aged out; on the GPU path the texel decodes with
//! magnitude `-1` and the particle is reinitialized on the next pass.

pub mod advector;
pub mod canvas;
pub mod codec;
pub mod distortion;
pub mod engine;
pub mod error;
pub mod field;
pub mod gpu;
pub mod grid;
pub mod projection;
pub mod sampler;
pub mod shader_utils;
pub mod spawn;
pub mod time;
pub mod visuals;

pub use advector::{Advector, AdvectorConfig, DrawCommand, Particle, Segment, MAX_PARTICLE_AGE};
pub use canvas::{Canvas, FADE_RETAIN};
pub use codec::WindSample;
pub use engine::{EngineEvent, FieldEngine, ResetPolicy, ScanStatus};
pub use error::{GpuError, TextureError};
pub use field::{Bounds, DenseField, FieldConfig, SeamGuard, Vector};
pub use glam::Vec2;
pub use grid::{ParticleTuning, RegularGrid, VectorGrid};
pub use projection::{Equirectangular, Mask, Orthographic, Projection, VisibilityMask};
pub use sampler::{build_field, CancelToken, FieldSampler, SampleProgress};
pub use spawn::{SpawnSlot, Spawner};
pub use time::{AnimationClock, FrameBudget};
pub use visuals::{ColorBuckets, ColorStyle, Palette};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use windtrail::prelude::*;
/// ```
pub mod prelude {
    pub use crate::advector::{Advector, AdvectorConfig, DrawCommand, Particle};
    pub use crate::canvas::{Canvas, FADE_RETAIN};
    pub use crate::engine::{EngineEvent, FieldEngine, ResetPolicy, ScanStatus};
    pub use crate::field::{Bounds, DenseField, FieldConfig, Vector};
    pub use crate::gpu::{FieldTexture, ParticleEvolver, StateLayout, TrailConfig, TrailRenderer};
    pub use crate::grid::{RegularGrid, VectorGrid};
    pub use crate::projection::{Equirectangular, Mask, Orthographic, Projection, VisibilityMask};
    pub use crate::time::{AnimationClock, FrameBudget};
    pub use crate::visuals::{ColorBuckets, Palette};
    pub use crate::Vec2;
}
