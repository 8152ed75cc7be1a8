//! Geographic vector grids.
//!
//! A grid product answers `interpolate(λ, φ)` with a raw (east, north) vector
//! or the null sentinel, and carries the tuning used to turn its native units
//! into on-screen particle motion.

use crate::field::Vector;

/// Particle tuning metadata shipped with a grid product.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleTuning {
    /// Multiplier from native units to pixels per frame.
    pub velocity_scale: f32,
    /// Intensity mapped to the brightest color bucket.
    pub max_intensity: f32,
}

impl ParticleTuning {
    /// Create tuning from an absolute velocity scale.
    pub fn new(velocity_scale: f32, max_intensity: f32) -> Self {
        Self {
            velocity_scale,
            max_intensity: max_intensity.max(f32::EPSILON),
        }
    }

    /// Surface wind in m/s: scale proportional to the view height.
    pub fn surface_wind(view_height: u32) -> Self {
        Self::new(view_height as f32 / 60_000.0, 17.0)
    }
}

impl Default for ParticleTuning {
    fn default() -> Self {
        Self::new(1.0, 17.0)
    }
}

/// A geographic vector field that can be sampled anywhere.
pub trait VectorGrid: Send + Sync {
    /// Raw `(u, v)` at `(λ, φ)` degrees, [`Vector::NULL`] where there is no data.
    fn interpolate(&self, lon: f64, lat: f64) -> Vector;

    /// Tuning for converting samples into particle motion.
    fn particles(&self) -> ParticleTuning;
}

/// Regularly spaced lat/lon grid, rows running north to south.
///
/// Point `(i, j)` sits at `λ = lon_first + i·dx`, `φ = lat_first − j·dy` and is
/// stored at `j * nx + i`. `NaN` marks missing values.
#[derive(Clone, Debug)]
pub struct RegularGrid {
    pub nx: usize,
    pub ny: usize,
    pub lon_first: f64,
    pub lat_first: f64,
    pub dx: f64,
    pub dy: f64,
    u: Vec<f32>,
    v: Vec<f32>,
    tuning: ParticleTuning,
}

impl RegularGrid {
    /// Create a grid from row-major component arrays.
    ///
    /// # Panics
    ///
    /// Panics if either array does not hold `nx * ny` values or the spacing is
    /// not positive.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nx: usize,
        ny: usize,
        lon_first: f64,
        lat_first: f64,
        dx: f64,
        dy: f64,
        u: Vec<f32>,
        v: Vec<f32>,
    ) -> Self {
        assert!(nx >= 2 && ny >= 2, "Grid needs at least 2x2 points");
        assert!(dx > 0.0 && dy > 0.0, "Grid spacing must be positive");
        assert_eq!(u.len(), nx * ny, "u component size mismatch");
        assert_eq!(v.len(), nx * ny, "v component size mismatch");
        Self {
            nx,
            ny,
            lon_first,
            lat_first,
            dx,
            dy,
            u,
            v,
            tuning: ParticleTuning::default(),
        }
    }

    /// Build a grid by evaluating `f(λ, φ) -> (u, v)` at every point.
    pub fn from_fn<F>(
        nx: usize,
        ny: usize,
        lon_first: f64,
        lat_first: f64,
        dx: f64,
        dy: f64,
        mut f: F,
    ) -> Self
    where
        F: FnMut(f64, f64) -> (f32, f32),
    {
        let mut u = Vec::with_capacity(nx * ny);
        let mut v = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            let lat = lat_first - j as f64 * dy;
            for i in 0..nx {
                let (pu, pv) = f(lon_first + i as f64 * dx, lat);
                u.push(pu);
                v.push(pv);
            }
        }
        Self::new(nx, ny, lon_first, lat_first, dx, dy, u, v)
    }

    /// A grid holding the same vector everywhere.
    #[allow(clippy::too_many_arguments)]
    pub fn uniform(
        nx: usize,
        ny: usize,
        lon_first: f64,
        lat_first: f64,
        dx: f64,
        dy: f64,
        u: f32,
        v: f32,
    ) -> Self {
        Self::from_fn(nx, ny, lon_first, lat_first, dx, dy, |_, _| (u, v))
    }

    /// Attach particle tuning.
    pub fn with_tuning(mut self, tuning: ParticleTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Whether the grid spans all longitudes and wraps at the antimeridian.
    pub fn is_global(&self) -> bool {
        self.nx as f64 * self.dx >= 360.0 - 1e-9
    }

    /// Wind direction in degrees `[0, 360)` measured clockwise from north.
    pub fn direction_at(&self, lon: f64, lat: f64) -> Option<f32> {
        let sample = self.interpolate(lon, lat);
        sample.magnitude?;
        Some(sample.u.atan2(sample.v).to_degrees().rem_euclid(360.0))
    }

    fn point(&self, i: usize, j: usize) -> Option<(f32, f32)> {
        let k = j * self.nx + i;
        let (u, v) = (self.u[k], self.v[k]);
        if u.is_nan() || v.is_nan() {
            None
        } else {
            Some((u, v))
        }
    }
}

impl VectorGrid for RegularGrid {
    fn interpolate(&self, lon: f64, lat: f64) -> Vector {
        if !lon.is_finite() || !lat.is_finite() {
            return Vector::NULL;
        }

        let fi = if self.is_global() {
            (lon - self.lon_first).rem_euclid(360.0) / self.dx
        } else {
            (lon - self.lon_first) / self.dx
        };
        let fj = (self.lat_first - lat) / self.dy;

        let last_i = (self.nx - 1) as f64;
        let last_j = (self.ny - 1) as f64;
        if fj < 0.0 || fj > last_j {
            return Vector::NULL;
        }
        if !self.is_global() && (fi < 0.0 || fi > last_i) {
            return Vector::NULL;
        }

        let i0 = (fi.floor() as usize).min(self.nx - 1);
        let j0 = (fj.floor() as usize).min(self.ny - 1);
        let i1 = if self.is_global() {
            (i0 + 1) % self.nx
        } else {
            (i0 + 1).min(self.nx - 1)
        };
        let j1 = (j0 + 1).min(self.ny - 1);
        let wx = (fi - i0 as f64) as f32;
        let wy = (fj - j0 as f64) as f32;

        let (Some(g00), Some(g10), Some(g01), Some(g11)) =
            (self.point(i0, j0), self.point(i1, j0), self.point(i0, j1), self.point(i1, j1))
        else {
            return Vector::NULL;
        };

        // Nested form keeps uniform neighborhoods exact
        let lerp2 = |a: f32, b: f32, c: f32, d: f32| {
            let top = a + (b - a) * wx;
            let bottom = c + (d - c) * wx;
            top + (bottom - top) * wy
        };
        let u = lerp2(g00.0, g10.0, g01.0, g11.0);
        let v = lerp2(g00.1, g10.1, g01.1, g11.1);
        Vector::new(u, v, u.hypot(v))
    }

    fn particles(&self) -> ParticleTuning {
        self.tuning
    }
}
