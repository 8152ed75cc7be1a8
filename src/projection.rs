//! Map projections and visibility masks.
//!
//! The engine only needs three things from a projection: a forward mapping
//! `(λ, φ) → (x, y)`, an optional inverse, and the screen rectangle occupied by
//! the sphere. Coordinates are degrees; screen y grows downward.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::distortion::{self, Distortion};

/// A geographic → screen mapping.
pub trait Projection: Send + Sync {
    /// Map `(λ, φ)` in degrees to screen pixels, `None` if not visible.
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]>;

    /// Map screen pixels back to `(λ, φ)`, `None` off the sphere.
    fn invert(&self, _x: f64, _y: f64) -> Option<[f64; 2]> {
        None
    }

    /// Upper-left and lower-right screen corners of the sphere.
    fn extent(&self) -> ([f64; 2], [f64; 2]);

    /// Local distortion at `(λ, φ)`, whose screen image is `(x, y)`.
    fn distortion(&self, lon: f64, lat: f64, x: f64, y: f64) -> Distortion {
        distortion::distortion(self, lon, lat, x, y)
    }
}

/// Plate carrée: longitude and latitude map linearly to x and y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Equirectangular {
    /// Pixels per radian.
    pub scale: f64,
    /// Screen position of `(0°, 0°)`.
    pub translate: [f64; 2],
}

impl Equirectangular {
    /// Fit the whole globe into a `width` × `height` viewport.
    pub fn fit(width: u32, height: u32) -> Self {
        let scale = (width as f64 / (2.0 * PI)).min(height as f64 / PI);
        Self {
            scale,
            translate: [width as f64 / 2.0, height as f64 / 2.0],
        }
    }
}

impl Projection for Equirectangular {
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        Some([
            self.translate[0] + self.scale * lon.to_radians(),
            self.translate[1] - self.scale * lat.to_radians(),
        ])
    }

    fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let lon = ((x - self.translate[0]) / self.scale).to_degrees();
        let lat = ((self.translate[1] - y) / self.scale).to_degrees();
        if lon.abs() > 180.0 || lat.abs() > 90.0 || !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        Some([lon, lat])
    }

    fn extent(&self) -> ([f64; 2], [f64; 2]) {
        let [tx, ty] = self.translate;
        let s = self.scale;
        ([tx - s * PI, ty - s * FRAC_PI_2], [tx + s * PI, ty + s * FRAC_PI_2])
    }
}

/// Globe seen from infinitely far away, centered on `rotate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orthographic {
    /// Globe radius in pixels.
    pub scale: f64,
    /// Screen position of the globe center.
    pub translate: [f64; 2],
    /// `[λ0, φ0]` in degrees at the center of the disc.
    pub rotate: [f64; 2],
}

impl Orthographic {
    /// Fit the globe into a `width` × `height` viewport, centered on `(lon, lat)`.
    pub fn fit(width: u32, height: u32, lon: f64, lat: f64) -> Self {
        Self {
            scale: width.min(height) as f64 * 0.45,
            translate: [width as f64 / 2.0, height as f64 / 2.0],
            rotate: [lon, lat],
        }
    }
}

impl Projection for Orthographic {
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let (sin_p0, cos_p0) = self.rotate[1].to_radians().sin_cos();
        let (sin_p, cos_p) = lat.to_radians().sin_cos();
        let (sin_dl, cos_dl) = (lon - self.rotate[0]).to_radians().sin_cos();

        // Back face of the globe
        let cos_c = sin_p0 * sin_p + cos_p0 * cos_p * cos_dl;
        if cos_c < 0.0 {
            return None;
        }

        Some([
            self.translate[0] + self.scale * cos_p * sin_dl,
            self.translate[1] - self.scale * (cos_p0 * sin_p - sin_p0 * cos_p * cos_dl),
        ])
    }

    fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let px = (x - self.translate[0]) / self.scale;
        let py = (self.translate[1] - y) / self.scale;
        let rho = px.hypot(py);
        if !rho.is_finite() || rho > 1.0 {
            return None;
        }
        let (sin_p0, cos_p0) = self.rotate[1].to_radians().sin_cos();
        if rho == 0.0 {
            return Some([self.rotate[0], self.rotate[1]]);
        }
        let (sin_c, cos_c) = rho.asin().sin_cos();
        let lat = (cos_c * sin_p0 + py * sin_c * cos_p0 / rho).clamp(-1.0, 1.0).asin();
        let dl = (px * sin_c).atan2(rho * cos_p0 * cos_c - py * sin_p0 * sin_c);

        let mut lon = self.rotate[0] + dl.to_degrees();
        lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
        Some([lon, lat.to_degrees()])
    }

    fn extent(&self) -> ([f64; 2], [f64; 2]) {
        let [tx, ty] = self.translate;
        let s = self.scale;
        ([tx - s, ty - s], [tx + s, ty + s])
    }
}

/// Per-pixel visibility test consulted by the field sampler.
pub trait Mask: Send + Sync {
    /// Whether the pixel shows part of the globe.
    fn is_visible(&self, x: i32, y: i32) -> bool;
}

impl<F> Mask for F
where
    F: Fn(i32, i32) -> bool + Send + Sync,
{
    fn is_visible(&self, x: i32, y: i32) -> bool {
        self(x, y)
    }
}

/// Rasterized visibility mask for a fixed viewport.
#[derive(Clone, Debug)]
pub struct VisibilityMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl VisibilityMask {
    /// Mark every pixel the projection can invert to finite coordinates.
    pub fn from_projection(projection: &dyn Projection, width: u32, height: u32) -> Self {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let visible = projection
                    .invert(x as f64, y as f64)
                    .is_some_and(|[lon, lat]| lon.is_finite() && lat.is_finite());
                bits.push(visible);
            }
        }
        Self { width, height, bits }
    }

    /// Number of visible pixels.
    pub fn visible_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }
}

impl Mask for VisibilityMask {
    fn is_visible(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }
}
