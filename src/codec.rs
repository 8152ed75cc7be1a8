//! Fixed-point encodings for the GPU particle and field textures.
//!
//! All textures are RGBA8. Each function comes in a byte form (what sits in
//! texture memory) and a unorm form (channel values in `[0, 1]`, what a
//! shader reads and writes).
//!
//! # Layouts
//!
//! | Texel | R | G | B | A |
//! |---|---|---|---|---|
//! | position | `x` hi | `x` lo | `y` hi | `y` lo |
//! | age | `age` | 0 | 0 | 0.5 |
//! | wind | `u12 >> 4` | `(u12 & 0xF) << 4 \| v12 >> 8` | `v12 & 0xFF` | valid |
//!
//! Positions are 12.4 fixed point (`x * 16` in 16 bits). Wind components are
//! offset by 128 and scaled by 16 into 12 bits, covering `[-128, 127.9375]`.
//! Values outside a range are clamped, never wrapped.

use crate::field::Vector;

/// Age value meaning "this particle needs (re)initialization".
pub const AGE_SENTINEL: u32 = 127;

/// Largest encodable position coordinate.
pub const MAX_POSITION: f32 = 4095.9375;

/// Smallest encodable wind component.
pub const MIN_WIND: f32 = -128.0;

/// Largest encodable wind component.
pub const MAX_WIND: f32 = 127.9375;

/// Fixed-point scale shared by positions and wind.
const FIXED_SCALE: f32 = 16.0;

/// Wind decoded from a field texel.
///
/// An invalid texel decodes to `magnitude == -1.0`, the GPU path's in-band
/// flag. The CPU path uses `Vector::NULL` (no magnitude) instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindSample {
    pub u: f32,
    pub v: f32,
    pub magnitude: f32,
}

impl WindSample {
    /// The invalid-texel result.
    pub const INVALID: Self = Self {
        u: 0.0,
        v: 0.0,
        magnitude: -1.0,
    };

    /// Whether the texel carried data.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magnitude >= 0.0
    }
}

// ========== Unorm conversion ==========

/// Bytes to `[0, 1]` channel values.
#[inline]
pub fn to_unorm(bytes: [u8; 4]) -> [f32; 4] {
    bytes.map(|b| b as f32 / 255.0)
}

/// `[0, 1]` channel values to bytes, rounding to nearest.
#[inline]
pub fn from_unorm(rgba: [f32; 4]) -> [u8; 4] {
    rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

// ========== Position ==========

#[inline]
fn fixed16(value: f32) -> u16 {
    if value.is_nan() {
        return 0;
    }
    (value * FIXED_SCALE).floor().clamp(0.0, u16::MAX as f32) as u16
}

/// Encode a screen position as texture bytes.
#[inline]
pub fn pack_position_bytes(x: f32, y: f32) -> [u8; 4] {
    let [x_hi, x_lo] = fixed16(x).to_be_bytes();
    let [y_hi, y_lo] = fixed16(y).to_be_bytes();
    [x_hi, x_lo, y_hi, y_lo]
}

/// Decode a screen position from texture bytes.
#[inline]
pub fn unpack_position_bytes(bytes: [u8; 4]) -> (f32, f32) {
    let x = u16::from_be_bytes([bytes[0], bytes[1]]);
    let y = u16::from_be_bytes([bytes[2], bytes[3]]);
    (x as f32 / FIXED_SCALE, y as f32 / FIXED_SCALE)
}

/// Encode a screen position as unorm channels.
#[inline]
pub fn pack_position(x: f32, y: f32) -> [f32; 4] {
    to_unorm(pack_position_bytes(x, y))
}

/// Decode a screen position from unorm channels.
#[inline]
pub fn unpack_position(rgba: [f32; 4]) -> (f32, f32) {
    unpack_position_bytes(from_unorm(rgba))
}

// ========== Age ==========

/// Encode an age (clamped to 255) as texture bytes.
#[inline]
pub fn pack_age_bytes(age: u32) -> [u8; 4] {
    [age.min(255) as u8, 0, 0, 128]
}

/// Decode an age from texture bytes.
#[inline]
pub fn unpack_age_bytes(bytes: [u8; 4]) -> u32 {
    bytes[0] as u32
}

/// Encode an age as unorm channels. Alpha is a fixed 0.5.
#[inline]
pub fn pack_age(age: u32) -> [f32; 4] {
    [age.min(255) as f32 / 255.0, 0.0, 0.0, 0.5]
}

/// Decode an age from unorm channels.
#[inline]
pub fn unpack_age(rgba: [f32; 4]) -> u32 {
    (rgba[0].clamp(0.0, 1.0) * 255.0).round() as u32
}

// ========== Wind ==========

#[inline]
fn fixed12(value: f32) -> u16 {
    if value.is_nan() {
        return 0;
    }
    ((value - MIN_WIND) * FIXED_SCALE).round().clamp(0.0, 4095.0) as u16
}

/// Encode a wind sample as texture bytes. `valid == false` zeroes the texel.
#[inline]
pub fn pack_wind_bytes(u: f32, v: f32, valid: bool) -> [u8; 4] {
    if !valid {
        return [0; 4];
    }
    let u12 = fixed12(u);
    let v12 = fixed12(v);
    [
        (u12 >> 4) as u8,
        (((u12 & 0xF) << 4) | (v12 >> 8)) as u8,
        (v12 & 0xFF) as u8,
        255,
    ]
}

/// Decode a wind sample from texture bytes.
#[inline]
pub fn unpack_wind_bytes(bytes: [u8; 4]) -> WindSample {
    if bytes[3] < 128 {
        return WindSample::INVALID;
    }
    let [r, g, b, _] = bytes.map(u16::from);
    let u12 = (r << 4) | (g >> 4);
    let v12 = ((g & 0xF) << 8) | b;
    let u = u12 as f32 / FIXED_SCALE + MIN_WIND;
    let v = v12 as f32 / FIXED_SCALE + MIN_WIND;
    WindSample {
        u,
        v,
        magnitude: u.hypot(v),
    }
}

/// Encode a wind sample as unorm channels.
#[inline]
pub fn pack_wind(u: f32, v: f32, valid: bool) -> [f32; 4] {
    to_unorm(pack_wind_bytes(u, v, valid))
}

/// Decode a wind sample from unorm channels.
#[inline]
pub fn unpack_wind(rgba: [f32; 4]) -> WindSample {
    if rgba[3] < 0.5 {
        return WindSample::INVALID;
    }
    unpack_wind_bytes(from_unorm(rgba))
}

/// Encode a dense-field vector; the null sentinel becomes an invalid texel.
#[inline]
pub fn pack_vector_bytes(vector: &Vector) -> [u8; 4] {
    pack_wind_bytes(vector.u, vector.v, vector.is_defined())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Position Tests ==========

    #[test]
    fn test_position_roundtrip_on_grid() {
        // Every representable x, paired with a y walking the range backwards
        for i in 0..=u16::MAX {
            let x = i as f32 / 16.0;
            let y = (u16::MAX - i) as f32 / 16.0;
            assert_eq!(unpack_position(pack_position(x, y)), (x, y), "x = {x}");
        }
    }

    #[test]
    fn test_position_quantizes_down() {
        let (x, y) = unpack_position(pack_position(10.07, 3.99));
        assert_eq!(x, 10.0625);
        assert_eq!(y, 3.9375);
    }

    #[test]
    fn test_position_clamps() {
        assert_eq!(unpack_position(pack_position(-5.0, 9000.0)), (0.0, MAX_POSITION));
        assert_eq!(unpack_position(pack_position(f32::NAN, 1.0)), (0.0, 1.0));
    }

    #[test]
    fn test_position_byte_layout() {
        // 100.5 * 16 = 1608 = 0x0648
        assert_eq!(pack_position_bytes(100.5, 0.0), [0x06, 0x48, 0, 0]);
    }

    // ========== Age Tests ==========

    #[test]
    fn test_age_roundtrip_exhaustive() {
        for age in 0..=255 {
            assert_eq!(unpack_age(pack_age(age)), age);
            assert_eq!(unpack_age_bytes(pack_age_bytes(age)), age);
        }
    }

    #[test]
    fn test_age_fixed_channels() {
        let texel = pack_age(AGE_SENTINEL);
        assert_eq!(texel[1], 0.0);
        assert_eq!(texel[2], 0.0);
        assert_eq!(texel[3], 0.5);
        assert_eq!(unpack_age(pack_age(1000)), 255);
    }

    // ========== Wind Tests ==========

    #[test]
    fn test_wind_roundtrip_within_step() {
        let mut u = MIN_WIND;
        while u <= MAX_WIND {
            let v = -u * 0.5;
            let w = unpack_wind(pack_wind(u, v, true));
            assert!((w.u - u).abs() <= 1.0 / 16.0, "u = {u}");
            assert!((w.v - v).abs() <= 1.0 / 16.0, "v = {v}");
            u += 0.37;
        }
    }

    #[test]
    fn test_wind_clamps_not_wraps() {
        let w = unpack_wind(pack_wind(500.0, -500.0, true));
        assert_eq!(w.u, MAX_WIND);
        assert_eq!(w.v, MIN_WIND);
    }

    #[test]
    fn test_wind_zero_is_exact() {
        let w = unpack_wind_bytes(pack_wind_bytes(0.0, 0.0, true));
        assert_eq!((w.u, w.v, w.magnitude), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_invalid_wind_is_minus_one() {
        // GPU path flags gaps in-band with -1; the CPU path uses Vector::NULL
        let w = unpack_wind(pack_wind(3.0, 4.0, false));
        assert_eq!(w.magnitude, -1.0);
        assert!(!w.is_valid());
        assert!(Vector::NULL.magnitude.is_none());
        assert_eq!(pack_vector_bytes(&Vector::NULL), [0; 4]);
    }

    #[test]
    fn test_wind_magnitude() {
        let w = unpack_wind(pack_wind(3.0, 4.0, true));
        assert!(w.is_valid());
        assert!((w.magnitude - 5.0).abs() < 1e-6);
    }
}
