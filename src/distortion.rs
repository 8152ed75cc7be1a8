//! Local projection distortion.
//!
//! Converts a geographic `(u, v)` vector (east, north) into a screen-space
//! pixel displacement by numerically differentiating the projection at the
//! sample point.

use crate::projection::Projection;

/// Angular probe step in degrees, about 4 m of arc on the Earth's surface.
pub const H: f64 = 0.0000360;

/// Jacobian-like factors `[a, b, c, d]`.
///
/// `(a, b)` is the screen displacement per degree of longitude (meridian scale
/// corrected), `(c, d)` per degree of latitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Distortion(pub [f64; 4]);

impl Distortion {
    /// No displacement. Returned when the projection cannot be probed.
    pub const ZERO: Distortion = Distortion([0.0; 4]);

    /// Screen axes aligned with east and south, one pixel per unit.
    pub const IDENTITY: Distortion = Distortion([1.0, 0.0, 0.0, 1.0]);

    /// Whether every factor is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|f| *f == 0.0)
    }

    /// Apply to `(u, v)` scaled by `scale`: `dx = a·u' + c·v'`, `dy = b·u' + d·v'`.
    pub fn apply(&self, u: f32, v: f32, scale: f32) -> (f32, f32) {
        let [a, b, c, d] = self.0;
        let u = (u * scale) as f64;
        let v = (v * scale) as f64;
        ((a * u + c * v) as f32, (b * u + d * v) as f32)
    }
}

/// Differentiate `projection` at `(λ, φ)` whose screen image is `(x, y)`.
///
/// Probes step toward the equator and prime meridian so they stay inside the
/// projection's domain near its edges. The longitude partials are divided by
/// `cos φ` because a degree of longitude shrinks toward the poles.
pub fn distortion<P: Projection + ?Sized>(
    projection: &P,
    lon: f64,
    lat: f64,
    x: f64,
    y: f64,
) -> Distortion {
    let h_lon = if lon < 0.0 { H } else { -H };
    let h_lat = if lat < 0.0 { H } else { -H };

    let (Some(p_lon), Some(p_lat)) = (
        projection.project(lon + h_lon, lat),
        projection.project(lon, lat + h_lat),
    ) else {
        return Distortion::ZERO;
    };
    if !p_lon.iter().chain(p_lat.iter()).all(|c| c.is_finite()) {
        return Distortion::ZERO;
    }

    let k = lat.to_radians().cos();
    Distortion([
        (p_lon[0] - x) / h_lon / k,
        (p_lon[1] - y) / h_lon / k,
        (p_lat[0] - x) / h_lat,
        (p_lat[1] - y) / h_lat,
    ])
}

/// Distort a geographic vector at `(λ, φ)` into a pixel displacement.
#[allow(clippy::too_many_arguments)]
pub fn distort<P: Projection + ?Sized>(
    projection: &P,
    lon: f64,
    lat: f64,
    x: f64,
    y: f64,
    scale: f32,
    u: f32,
    v: f32,
) -> (f32, f32) {
    projection.distortion(lon, lat, x, y).apply(u, v, scale)
}
