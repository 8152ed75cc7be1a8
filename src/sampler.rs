//! Builds dense fields by scanning the visible screen region.
//!
//! The scan walks the bounds column by column at the configured stride,
//! inverts each pixel to `(λ, φ)`, samples the grid, distorts the vector into
//! pixel space and stores it over a `stride × stride` block.
//!
//! Scans are incremental: [`FieldSampler::step`] runs until its
//! [`FrameBudget`] trips and then yields, so a host loop can keep handling
//! input. A [`CancelToken`] abandons a scan at the next batch boundary; its
//! partial result is dropped, never merged into a later scan.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};

use crate::field::{Bounds, DenseField, FieldConfig, Vector};
use crate::grid::VectorGrid;
use crate::projection::{Mask, Projection};
use crate::time::FrameBudget;

/// Shared flag asking a scan to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Honored at the next batch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of one scan step.
#[derive(Debug)]
pub enum SampleProgress {
    /// Budget ran out; call `step` again after `resume_after`.
    Pending {
        /// Columns scanned so far.
        columns_done: u32,
        /// Columns in the whole scan.
        columns_total: u32,
        /// Pause before the next step, from [`FieldConfig::yield_pause`].
        resume_after: Duration,
    },
    /// Scan finished.
    Done(DenseField),
    /// Scan was cancelled and its partial result discarded.
    Cancelled,
}

/// Collaborators and settings for one scan, borrowed for its duration.
struct ScanInputs<'a> {
    projection: &'a dyn Projection,
    grid: &'a dyn VectorGrid,
    mask: &'a dyn Mask,
    config: &'a FieldConfig,
    velocity_scale: f32,
}

impl ScanInputs<'_> {
    /// Sample one screen column into `field`.
    fn scan_column(&self, x: i32, bounds: &Bounds, field: &mut DenseField) {
        let stride = self.config.stride as i32;
        let mut y = bounds.y;
        while y <= bounds.y_max {
            self.sample(x, y, stride, field);
            y += stride;
        }
    }

    fn sample(&self, x: i32, y: i32, stride: i32, field: &mut DenseField) {
        if !self.mask.is_visible(x, y) {
            return;
        }
        let Some([lon, lat]) = self.projection.invert(x as f64, y as f64) else {
            return;
        };
        if !lon.is_finite() || !lat.is_finite() {
            return;
        }
        if let Some(guard) = &self.config.seam_guard {
            if !guard.accepts(lon, lat) {
                return;
            }
        }

        let raw = self.grid.interpolate(lon, lat);
        let Some(magnitude) = raw.magnitude else {
            return;
        };

        let distortion = self.projection.distortion(lon, lat, x as f64, y as f64);
        if distortion.is_zero() {
            return;
        }
        let (u, v) = distortion.apply(raw.u, raw.v, self.velocity_scale);
        let vector = Vector::new(u, v, magnitude);

        for dx in 0..stride {
            for dy in 0..stride {
                field.set(x + dx, y + dy, vector);
            }
        }

        let speed = vector.speed();
        if speed.is_finite() && speed < self.config.max_displacement {
            field.push_valid(x, y);
        }
    }
}

/// Build a dense field in one go.
///
/// Degenerate bounds produce an empty field.
pub fn build_field(
    projection: &dyn Projection,
    grid: &dyn VectorGrid,
    mask: &dyn Mask,
    bounds: Bounds,
    config: &FieldConfig,
) -> DenseField {
    let inputs = ScanInputs {
        projection,
        grid,
        mask,
        config,
        velocity_scale: grid.particles().velocity_scale,
    };
    let mut field = DenseField::with_bounds(bounds);
    if bounds.is_degenerate() {
        return field;
    }
    let mut x = bounds.x;
    while x <= bounds.x_max {
        inputs.scan_column(x, &bounds, &mut field);
        x += config.stride as i32;
    }
    debug!(
        "Built dense field {}x{}: {} spawn positions",
        bounds.width,
        bounds.height,
        field.valid_positions().len()
    );
    field
}

/// Incremental, cancellable field scan.
pub struct FieldSampler {
    projection: Option<Arc<dyn Projection>>,
    grid: Option<Arc<dyn VectorGrid>>,
    mask: Option<Arc<dyn Mask>>,
    bounds: Option<Bounds>,
    config: FieldConfig,
    field: Option<DenseField>,
    next_x: i32,
    cancel: CancelToken,
}

impl FieldSampler {
    /// Prepare a scan. Missing collaborators or bounds yield an empty field.
    pub fn new(
        projection: Option<Arc<dyn Projection>>,
        grid: Option<Arc<dyn VectorGrid>>,
        mask: Option<Arc<dyn Mask>>,
        bounds: Option<Bounds>,
        config: FieldConfig,
    ) -> Self {
        let field = bounds.map(DenseField::with_bounds);
        let next_x = bounds.map(|b| b.x).unwrap_or(0);
        Self {
            projection,
            grid,
            mask,
            bounds,
            config,
            field,
            next_x,
            cancel: CancelToken::new(),
        }
    }

    /// Token that cancels this scan.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Total number of columns the scan visits.
    pub fn columns_total(&self) -> u32 {
        match self.bounds {
            Some(b) if !b.is_degenerate() => (b.width as u32).div_ceil(self.config.stride),
            _ => 0,
        }
    }

    fn columns_done(&self) -> u32 {
        match self.bounds {
            Some(b) => ((self.next_x - b.x).max(0) as u32).div_ceil(self.config.stride),
            None => 0,
        }
    }

    /// Scan columns until the budget trips, the scan ends, or it is cancelled.
    ///
    /// At least one column is processed per call so every step makes progress.
    pub fn step(&mut self, budget: &FrameBudget) -> SampleProgress {
        if self.cancel.is_cancelled() {
            self.field = None;
            debug!("Field scan cancelled at column {}", self.next_x);
            return SampleProgress::Cancelled;
        }

        let (Some(projection), Some(grid), Some(mask), Some(bounds)) =
            (&self.projection, &self.grid, &self.mask, self.bounds)
        else {
            debug!("Field scan missing a collaborator; nothing to animate");
            self.field = None;
            return SampleProgress::Done(DenseField::empty());
        };
        let Some(field) = self.field.as_mut() else {
            return SampleProgress::Done(DenseField::empty());
        };

        let inputs = ScanInputs {
            projection: projection.as_ref(),
            grid: grid.as_ref(),
            mask: mask.as_ref(),
            config: &self.config,
            velocity_scale: grid.particles().velocity_scale,
        };

        while self.next_x <= bounds.x_max {
            inputs.scan_column(self.next_x, &bounds, field);
            self.next_x += self.config.stride as i32;

            if self.next_x <= bounds.x_max && budget.exceeded() {
                trace!(
                    "Field scan yielding after {:?} at column {}",
                    budget.elapsed(),
                    self.next_x
                );
                return SampleProgress::Pending {
                    columns_done: self.columns_done(),
                    columns_total: self.columns_total(),
                    resume_after: self.config.yield_pause,
                };
            }
        }

        let field = self.field.take().unwrap_or_default();
        debug!(
            "Built dense field {}x{}: {} spawn positions",
            bounds.width,
            bounds.height,
            field.valid_positions().len()
        );
        SampleProgress::Done(field)
    }

    /// Finish the scan without yielding. Cancellation yields an empty field.
    pub fn run_to_completion(mut self) -> DenseField {
        match self.step(&FrameBudget::unlimited()) {
            SampleProgress::Done(field) => field,
            SampleProgress::Pending { .. } | SampleProgress::Cancelled => DenseField::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::Distortion;
    use crate::grid::{ParticleTuning, RegularGrid};

    /// Screen pixel == degree, no distortion.
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
            .with_tuning(ParticleTuning::new(1.0, 17.0))
    }

    fn everywhere(x: i32, y: i32) -> bool {
        (0..100).contains(&x) && (0..100).contains(&y)
    }

    fn square(grid: &RegularGrid, mask: &dyn Mask, config: &FieldConfig) -> DenseField {
        build_field(&Identity, grid, mask, Bounds::new(0, 0, 99, 99), config)
    }

    #[test]
    fn test_build_field_stores_two_by_two_blocks() {
        let field = square(&east_wind(10.0), &everywhere, &FieldConfig::new());
        for (x, y) in [(10, 10), (11, 10), (10, 11), (11, 11)] {
            let v = field.vector_at_pixel(x, y);
            assert_eq!((v.u, v.v), (10.0, 0.0), "pixel ({x}, {y})");
        }
        // only stride-aligned samples are spawn points
        assert!(field.valid_positions().iter().all(|[x, y]| x % 2 == 0 && y % 2 == 0));
    }

    #[test]
    fn test_seam_guard_rejects_polar_rows() {
        // Identity maps y to latitude
        let field = square(&east_wind(10.0), &everywhere, &FieldConfig::new());
        assert!(field.vector_at_pixel(10, 88).is_defined());
        assert!(!field.vector_at_pixel(10, 90).is_defined());
        assert!(field.vector_at_pixel(98, 10).is_defined());

        let unguarded = FieldConfig::new().without_seam_guard();
        let field = square(&east_wind(10.0), &everywhere, &unguarded);
        assert!(field.vector_at_pixel(10, 90).is_defined());
    }

    #[test]
    fn test_fast_vectors_are_not_spawn_points() {
        let field = square(&east_wind(50.0), &everywhere, &FieldConfig::new());
        assert!(field.vector_at_pixel(10, 10).is_defined());
        assert!(field.valid_positions().is_empty());
    }

    #[test]
    fn test_masked_pixels_stay_null() {
        let left_half = |x: i32, _y: i32| x < 50;
        let field = square(&east_wind(10.0), &left_half, &FieldConfig::new());
        assert!(field.vector_at_pixel(20, 20).is_defined());
        assert!(!field.vector_at_pixel(60, 20).is_defined());
    }

    #[test]
    fn test_missing_collaborator_gives_empty_field() {
        let sampler = FieldSampler::new(
            None,
            Some(Arc::new(east_wind(10.0))),
            Some(Arc::new(everywhere)),
            Some(Bounds::new(0, 0, 99, 99)),
            FieldConfig::new(),
        );
        let field = sampler.run_to_completion();
        assert!(field.is_empty());
        assert!(field.bounds().is_none());
    }

    #[test]
    fn test_incremental_scan_matches_one_shot() {
        let bounds = Bounds::new(0, 0, 99, 99);
        let mut sampler = FieldSampler::new(
            Some(Arc::new(Identity)),
            Some(Arc::new(east_wind(10.0))),
            Some(Arc::new(everywhere)),
            Some(bounds),
            FieldConfig::new().with_yield_pause(Duration::from_millis(7)),
        );
        assert_eq!(sampler.columns_total(), 50);

        let mut steps = 0;
        let field = loop {
            steps += 1;
            match sampler.step(&FrameBudget::new(Duration::ZERO)) {
                SampleProgress::Pending {
                    columns_done,
                    columns_total,
                    resume_after,
                } => {
                    assert_eq!(columns_done, steps);
                    assert_eq!(columns_total, 50);
                    assert_eq!(resume_after, Duration::from_millis(7));
                }
                SampleProgress::Done(field) => break field,
                SampleProgress::Cancelled => panic!("not cancelled"),
            }
        };
        assert_eq!(steps, 50);

        let one_shot = square(&east_wind(10.0), &everywhere, &FieldConfig::new());
        assert_eq!(field.valid_positions(), one_shot.valid_positions());
    }

    #[test]
    fn test_cancel_discards_partial_scan() {
        let mut sampler = FieldSampler::new(
            Some(Arc::new(Identity)),
            Some(Arc::new(east_wind(10.0))),
            Some(Arc::new(everywhere)),
            Some(Bounds::new(0, 0, 99, 99)),
            FieldConfig::new(),
        );
        let token = sampler.cancel_token();
        let progress = sampler.step(&FrameBudget::new(Duration::ZERO));
        assert!(matches!(progress, SampleProgress::Pending { .. }));
        token.cancel();
        assert!(matches!(sampler.step(&FrameBudget::unlimited()), SampleProgress::Cancelled));
        assert!(sampler.run_to_completion().is_empty());
    }
}
