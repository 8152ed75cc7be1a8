//! Dense per-pixel vector fields.
//!
//! A [`DenseField`] is the screen-space image of a geographic vector grid under
//! one projection. It is built by the [`FieldSampler`](crate::FieldSampler),
//! is immutable afterwards, and answers "which way does the wind blow at this
//! pixel" in constant time.
//!
//! # Null sentinel
//!
//! Pixels outside the visible globe, outside the grid's coverage, or at a
//! projection singularity hold [`Vector::NULL`]. That is not an error; a
//! particle that reaches such a pixel simply stops drawing and respawns.
//!
//! # Example
//!
//! ```ignore
//! let field = build_field(&projection, &grid, &mask, bounds, &FieldConfig::default());
//! let v = field.vector_at(120.4, 88.6);
//! if v.is_defined() {
//!     // v.u, v.v are pixel displacements per frame
//! }
//! ```

use std::time::Duration;

use rand::Rng;

use crate::projection::Projection;

/// A screen-space displacement with the geographic intensity it came from.
///
/// `u`/`v` are pixels per frame after distortion. `magnitude` is the raw
/// intensity used for color selection, or `None` for "no data here".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector {
    /// Horizontal displacement in pixels per frame.
    pub u: f32,
    /// Vertical displacement in pixels per frame (screen y grows downward).
    pub v: f32,
    /// Intensity in the grid's native units, `None` when undefined.
    pub magnitude: Option<f32>,
}

impl Vector {
    /// The "no data" sentinel.
    pub const NULL: Vector = Vector {
        u: f32::NAN,
        v: f32::NAN,
        magnitude: None,
    };

    /// Create a defined vector.
    pub fn new(u: f32, v: f32, magnitude: f32) -> Self {
        Self {
            u,
            v,
            magnitude: Some(magnitude),
        }
    }

    /// Whether this vector carries data.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.magnitude.is_some()
    }

    /// Length of the screen displacement in pixels per frame.
    #[inline]
    pub fn speed(&self) -> f32 {
        self.u.hypot(self.v)
    }
}

impl Default for Vector {
    fn default() -> Self {
        Vector::NULL
    }
}

/// Integer screen rectangle holding the visible part of the globe.
///
/// All edges are inclusive: `x..=x_max`, `y..=y_max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub x_max: i32,
    pub y_max: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Create bounds from inclusive corners.
    pub fn new(x: i32, y: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            x,
            y,
            x_max,
            y_max,
            width: x_max - x + 1,
            height: y_max - y + 1,
        }
    }

    /// Visible extent of `projection` clipped to a `view_width` × `view_height` viewport.
    ///
    /// Returns `None` when nothing of the sphere is on screen.
    pub fn for_view(
        projection: &dyn Projection,
        view_width: u32,
        view_height: u32,
    ) -> Option<Self> {
        let (upper_left, lower_right) = projection.extent();
        if !(upper_left.iter().chain(lower_right.iter()).all(|c| c.is_finite())) {
            return None;
        }
        let x = (upper_left[0].floor() as i32).max(0);
        let y = (upper_left[1].floor() as i32).max(0);
        let x_max = (lower_right[0].ceil() as i32).min(view_width as i32 - 1);
        let y_max = (lower_right[1].ceil() as i32).min(view_height as i32 - 1);
        let bounds = Self::new(x, y, x_max, y_max);
        if bounds.is_degenerate() {
            None
        } else {
            Some(bounds)
        }
    }

    /// Zero visible area.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Whether the pixel lies inside the rectangle.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x <= self.x_max && y >= self.y && y <= self.y_max
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        if self.is_degenerate() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }
}

/// Empirical guard against distortion blow-up near projection seams.
///
/// Samples whose inverted coordinates exceed either limit are dropped. The
/// latitude limit keeps samples away from the poles, where `cos φ` sends the
/// distortion to infinity; the longitude limit trims the antimeridian seam.
/// Both are tuned heuristics, not derived bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeamGuard {
    /// Largest accepted `|λ|` in degrees.
    pub max_abs_lon: f64,
    /// Largest accepted `|φ|` in degrees.
    pub max_abs_lat: f64,
}

impl SeamGuard {
    /// Whether a coordinate passes the guard.
    #[inline]
    pub fn accepts(&self, lon: f64, lat: f64) -> bool {
        lon.abs() <= self.max_abs_lon && lat.abs() <= self.max_abs_lat
    }
}

impl Default for SeamGuard {
    fn default() -> Self {
        Self {
            max_abs_lon: 179.0,
            max_abs_lat: 89.0,
        }
    }
}

/// Configuration for building a dense field.
#[derive(Clone, Debug)]
pub struct FieldConfig {
    /// Pixel stride of the scan. Each sample covers a `stride × stride` block.
    pub stride: u32,

    /// Largest screen displacement (pixels per frame) a spawn point may have.
    pub max_displacement: f32,

    /// Seam guard applied to inverted coordinates, `None` to disable.
    pub seam_guard: Option<SeamGuard>,

    /// Wall-clock budget for one batch of the scan before yielding.
    pub batch_budget: Duration,

    /// Suggested pause before the host resumes a yielded scan.
    pub yield_pause: Duration,
}

impl FieldConfig {
    /// Create a configuration with the default 2px stride.
    ///
    /// Default values:
    /// - `max_displacement`: 40.0 px/frame
    /// - `seam_guard`: `|λ| ≤ 179`, `|φ| ≤ 89`
    /// - `batch_budget`: 100 ms
    /// - `yield_pause`: 25 ms
    pub fn new() -> Self {
        Self {
            stride: 2,
            max_displacement: 40.0,
            seam_guard: Some(SeamGuard::default()),
            batch_budget: Duration::from_millis(100),
            yield_pause: Duration::from_millis(25),
        }
    }

    /// Set the scan stride (at least 1).
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride.max(1);
        self
    }

    /// Set the spawn sanity ceiling in pixels per frame.
    pub fn with_max_displacement(mut self, max: f32) -> Self {
        self.max_displacement = max.max(0.0);
        self
    }

    /// Replace the seam guard.
    pub fn with_seam_guard(mut self, guard: SeamGuard) -> Self {
        self.seam_guard = Some(guard);
        self
    }

    /// Disable the seam guard entirely.
    pub fn without_seam_guard(mut self) -> Self {
        self.seam_guard = None;
        self
    }

    /// Set the per-batch time budget.
    pub fn with_batch_budget(mut self, budget: Duration) -> Self {
        self.batch_budget = budget;
        self
    }

    /// Set the pause reported to the host after a yielded batch.
    pub fn with_yield_pause(mut self, pause: Duration) -> Self {
        self.yield_pause = pause;
        self
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Precomputed per-pixel vector lookup for one projection/grid pairing.
///
/// Storage is column-major relative to the bounds origin (`x * height + y`),
/// which is also the sample order of the GPU field texture.
#[derive(Clone, Debug)]
pub struct DenseField {
    bounds: Option<Bounds>,
    vectors: Vec<Vector>,
    valid_positions: Vec<[i32; 2]>,
}

impl DenseField {
    /// A field with nothing to animate.
    pub fn empty() -> Self {
        Self {
            bounds: None,
            vectors: Vec::new(),
            valid_positions: Vec::new(),
        }
    }

    /// Allocate an all-null field covering `bounds`.
    pub(crate) fn with_bounds(bounds: Bounds) -> Self {
        if bounds.is_degenerate() {
            return Self::empty();
        }
        Self {
            bounds: Some(bounds),
            vectors: vec![Vector::NULL; bounds.area()],
            valid_positions: Vec::new(),
        }
    }

    /// Bounds covered, `None` for an empty field.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Whether nothing can be animated.
    pub fn is_empty(&self) -> bool {
        self.valid_positions.is_empty()
    }

    /// Screen positions where particles may spawn.
    pub fn valid_positions(&self) -> &[[i32; 2]] {
        &self.valid_positions
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let b = self.bounds?;
        if !b.contains(x, y) {
            return None;
        }
        Some((x - b.x) as usize * b.height as usize + (y - b.y) as usize)
    }

    /// Vector at an integer pixel, null outside the field.
    #[inline]
    pub fn vector_at_pixel(&self, x: i32, y: i32) -> Vector {
        self.index(x, y).map(|i| self.vectors[i]).unwrap_or(Vector::NULL)
    }

    /// Vector at a fractional screen position (rounded to the nearest pixel).
    #[inline]
    pub fn vector_at(&self, x: f32, y: f32) -> Vector {
        if !x.is_finite() || !y.is_finite() {
            return Vector::NULL;
        }
        self.vector_at_pixel(x.round() as i32, y.round() as i32)
    }

    /// Whether the field is defined at a fractional screen position.
    #[inline]
    pub fn is_defined(&self, x: f32, y: f32) -> bool {
        self.vector_at(x, y).is_defined()
    }

    /// Pick a spawn point uniformly from the valid positions.
    pub fn random_valid<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<[i32; 2]> {
        if self.valid_positions.is_empty() {
            return None;
        }
        Some(self.valid_positions[rng.gen_range(0..self.valid_positions.len())])
    }

    /// Column-major vector storage, `height` entries per column.
    pub fn columns(&self) -> &[Vector] {
        &self.vectors
    }

    pub(crate) fn set(&mut self, x: i32, y: i32, vector: Vector) {
        if let Some(i) = self.index(x, y) {
            self.vectors[i] = vector;
        }
    }

    pub(crate) fn push_valid(&mut self, x: i32, y: i32) {
        self.valid_positions.push([x, y]);
    }
}

impl Default for DenseField {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    // ========== Bounds Tests ==========

    #[test]
    fn test_bounds_new_inclusive() {
        let b = Bounds::new(0, 0, 99, 49);
        assert_eq!(b.width, 100);
        assert_eq!(b.height, 50);
        assert_eq!(b.area(), 5000);
        assert!(b.contains(99, 49));
        assert!(!b.contains(100, 0));
    }

    #[test]
    fn test_bounds_degenerate() {
        let b = Bounds::new(10, 10, 9, 20);
        assert!(b.is_degenerate());
        assert_eq!(b.area(), 0);
    }

    // ========== FieldConfig Tests ==========

    #[test]
    fn test_field_config_defaults() {
        let config = FieldConfig::new();
        assert_eq!(config.stride, 2);
        assert!((config.max_displacement - 40.0).abs() < 1e-6);
        assert_eq!(config.seam_guard, Some(SeamGuard::default()));
        assert_eq!(config.batch_budget, Duration::from_millis(100));
        assert_eq!(config.yield_pause, Duration::from_millis(25));
    }

    #[test]
    fn test_field_config_clamping() {
        let config = FieldConfig::new().with_stride(0).with_max_displacement(-3.0);
        assert_eq!(config.stride, 1);
        assert_eq!(config.max_displacement, 0.0);
        assert!(FieldConfig::new().without_seam_guard().seam_guard.is_none());
    }

    #[test]
    fn test_seam_guard_limits() {
        let guard = SeamGuard::default();
        assert!(guard.accepts(-179.0, 89.0));
        assert!(guard.accepts(120.0, -45.0));
        assert!(!guard.accepts(0.0, 89.5));
        assert!(!guard.accepts(179.5, 0.0));
    }

    // ========== DenseField Tests ==========

    #[test]
    fn test_empty_field_is_safe() {
        let field = DenseField::empty();
        assert!(field.is_empty());
        assert!(field.bounds().is_none());
        assert!(!field.vector_at(3.0, 4.0).is_defined());
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(field.random_valid(&mut rng).is_none());
    }

    #[test]
    fn test_vector_lookup_rounds() {
        let mut field = DenseField::with_bounds(Bounds::new(0, 0, 9, 9));
        field.set(4, 5, Vector::new(1.0, 2.0, 3.0));

        assert_eq!(field.vector_at(4.4, 4.6), Vector::new(1.0, 2.0, 3.0));
        assert!(!field.vector_at(4.6, 4.6).is_defined());
        assert!(!field.vector_at(f32::NAN, 1.0).is_defined());
        assert!(!field.vector_at(-1.0, 0.0).is_defined());
    }

    #[test]
    fn test_storage_is_column_major() {
        let mut field = DenseField::with_bounds(Bounds::new(2, 3, 4, 6));
        field.set(3, 3, Vector::new(7.0, 0.0, 7.0));
        // column 1 (x = 3), row 0 (y = 3), height 4
        assert_eq!(field.columns()[4].u, 7.0);
    }

    #[test]
    fn test_null_vector_sentinel() {
        assert!(!Vector::NULL.is_defined());
        assert!(!Vector::default().is_defined());
        assert!((Vector::new(3.0, 4.0, 1.0).speed() - 5.0).abs() < 1e-6);
    }
}
