//! Engine orchestration for the CPU path.
//!
//! [`FieldEngine`] owns the current dense field, the scan that will replace
//! it, and the particle pool. The host drives it from its own loop:
//!
//! ```ignore
//! let mut engine = FieldEngine::new(AdvectorConfig::new(), FieldConfig::new(), 42);
//! let events = engine.subscribe();
//! engine.rebuild(Some(projection), Some(grid), Some(mask), bounds, ResetPolicy::Reallocate);
//!
//! loop {
//!     if let ScanStatus::Yielded { resume_after } = engine.pump() {
//!         host.wake_after(resume_after);
//!     }
//!     if clock.poll(Instant::now()) {
//!         if let Some(draw) = engine.tick() {
//!             canvas.render(&draw, FADE_RETAIN);
//!         }
//!     }
//! }
//! ```
//!
//! Nothing runs in the background. A rebuild while a scan is in flight cancels
//! that scan; its partial field is dropped and the previous field keeps
//! animating until the new one is complete.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::advector::{Advector, AdvectorConfig, DrawCommand, Particle};
use crate::field::{Bounds, DenseField, FieldConfig};
use crate::grid::VectorGrid;
use crate::projection::{Mask, Projection};
use crate::sampler::{FieldSampler, SampleProgress};
use crate::spawn::Spawner;
use crate::time::FrameBudget;
use crate::visuals::{ColorBuckets, Palette};

/// What happens to the particle pool when a rebuilt field is installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Keep particles where they are (minor field update).
    Keep,
    /// Allocate and scatter a fresh pool (new dataset or projection).
    #[default]
    Reallocate,
}

/// Notifications sent to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new dense field is installed.
    FieldReady {
        /// Number of valid spawn positions.
        valid: usize,
    },
    /// An in-flight scan was abandoned.
    ScanCancelled,
    /// The particle pool was reallocated.
    PoolReset {
        /// New pool size.
        count: usize,
    },
}

/// Where the scan in flight stands after a pump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStatus {
    /// No scan remains: it finished, was cancelled, or never started.
    Idle,
    /// The batch budget ran out; pump again after `resume_after`.
    Yielded { resume_after: Duration },
}

impl ScanStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, ScanStatus::Idle)
    }
}

struct PendingScan {
    sampler: FieldSampler,
    policy: ResetPolicy,
    max_intensity: f32,
}

/// Owns the dense field and particle pool.
pub struct FieldEngine {
    advector_config: AdvectorConfig,
    field_config: FieldConfig,
    palette: Option<Palette>,
    seed: u64,
    generation: u64,
    field: DenseField,
    advector: Option<Advector>,
    scan: Option<PendingScan>,
    subscribers: Vec<Sender<EngineEvent>>,
}

impl FieldEngine {
    /// An engine with no field. `seed` makes particle spawning reproducible.
    pub fn new(advector_config: AdvectorConfig, field_config: FieldConfig, seed: u64) -> Self {
        Self {
            advector_config,
            field_config,
            palette: None,
            seed,
            generation: 0,
            field: DenseField::empty(),
            advector: None,
            scan: None,
            subscribers: Vec::new(),
        }
    }

    /// Color particles from a palette instead of the grey intensity scale.
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Receive [`EngineEvent`]s. Dropped receivers are pruned on the next send.
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: EngineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Start building a new field, cancelling any scan in flight.
    ///
    /// Any missing collaborator produces an empty field: nothing animates.
    pub fn rebuild(
        &mut self,
        projection: Option<Arc<dyn Projection>>,
        grid: Option<Arc<dyn VectorGrid>>,
        mask: Option<Arc<dyn Mask>>,
        bounds: Option<Bounds>,
        policy: ResetPolicy,
    ) {
        self.cancel_scan();

        let max_intensity = grid
            .as_ref()
            .map(|g| g.particles().max_intensity)
            .unwrap_or(1.0);
        let sampler = FieldSampler::new(projection, grid, mask, bounds, self.field_config.clone());
        debug!(
            "Field rebuild started: {} columns, {:?}",
            sampler.columns_total(),
            policy
        );
        self.scan = Some(PendingScan {
            sampler,
            policy,
            max_intensity,
        });
    }

    /// Abandon the scan in flight, if any.
    pub fn cancel_scan(&mut self) {
        if let Some(scan) = self.scan.take() {
            scan.sampler.cancel_token().cancel();
            warn!("Field rebuild cancelled before completion");
            self.emit(EngineEvent::ScanCancelled);
        }
    }

    /// Whether a scan is in flight.
    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    /// Advance the scan in flight for one batch budget.
    pub fn pump(&mut self) -> ScanStatus {
        let budget = FrameBudget::new(self.field_config.batch_budget);
        self.pump_with(&budget)
    }

    /// Advance the scan in flight within `budget`.
    pub fn pump_with(&mut self, budget: &FrameBudget) -> ScanStatus {
        let Some(scan) = self.scan.as_mut() else {
            return ScanStatus::Idle;
        };
        match scan.sampler.step(budget) {
            SampleProgress::Pending { resume_after, .. } => ScanStatus::Yielded { resume_after },
            SampleProgress::Cancelled => {
                self.scan = None;
                self.emit(EngineEvent::ScanCancelled);
                ScanStatus::Idle
            }
            SampleProgress::Done(field) => {
                if let Some(scan) = self.scan.take() {
                    self.install(field, scan.policy, scan.max_intensity);
                }
                ScanStatus::Idle
            }
        }
    }

    /// Run the scan in flight to completion, ignoring the yield pause.
    pub fn finish_scan(&mut self) {
        while !self.pump_with(&FrameBudget::unlimited()).is_idle() {}
    }

    fn color_buckets(&self, max_intensity: f32) -> ColorBuckets {
        let step = self.advector_config.intensity_scale_step;
        let greys = ColorBuckets::intensity_scale(step, max_intensity);
        match self.palette {
            Some(palette) => ColorBuckets::from_palette(palette, greys.len(), max_intensity),
            None => greys,
        }
    }

    fn install(&mut self, field: DenseField, policy: ResetPolicy, max_intensity: f32) {
        let buckets = self.color_buckets(max_intensity);
        let valid = field.valid_positions().len();
        self.field = field;
        self.emit(EngineEvent::FieldReady { valid });

        match self.advector.as_mut() {
            Some(advector) if policy == ResetPolicy::Keep && !advector.particles().is_empty() => {
                advector.set_buckets(buckets);
                debug!("Field installed, keeping {} particles", advector.particles().len());
            }
            _ => {
                self.generation += 1;
                let spawner = Spawner::seeded(self.seed.wrapping_add(self.generation));
                let config = self.advector_config.clone();
                let advector = Advector::new(config, &self.field, buckets, spawner);
                let count = advector.particles().len();
                info!("Particle pool reset: {} particles over {} spawn positions", count, valid);
                self.advector = Some(advector);
                self.emit(EngineEvent::PoolReset { count });
            }
        }
    }

    /// One animation tick. `None` while there is nothing to animate.
    pub fn tick(&mut self) -> Option<DrawCommand> {
        if self.field.is_empty() {
            return None;
        }
        let advector = self.advector.as_mut()?;
        Some(advector.advance(&self.field))
    }

    /// A fresh particle at a random valid position of the current field.
    pub fn randomize(&mut self) -> Option<Particle> {
        let advector = self.advector.as_mut()?;
        advector.randomize(&self.field)
    }

    /// The installed field.
    pub fn field(&self) -> &DenseField {
        &self.field
    }

    /// The particle pool, empty before the first field.
    pub fn particles(&self) -> &[Particle] {
        self.advector.as_ref().map(|a| a.particles()).unwrap_or(&[])
    }

    /// Color scale of the current pool.
    pub fn buckets(&self) -> Option<&ColorBuckets> {
        self.advector.as_ref().map(|a| a.buckets())
    }
}
