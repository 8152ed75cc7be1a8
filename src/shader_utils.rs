//! WGSL utility functions shared by the GPU passes.
//!
//! Every function here has a Rust twin so CPU tests can reproduce what a
//! shader computes bit for bit (hashes) or within one quantization step
//! (codecs).
//!
//! # Available Functions
//!
//! ## Random & Hash ([`crate::spawn`])
//! - `hash(n: u32) -> u32` - Hash a u32 to pseudo-random u32
//! - `hash3(p: vec3<u32>) -> u32` - Hash a 3D coordinate to pseudo-random u32
//! - `rand(seed: u32) -> f32` - Returns random float in [0, 1]
//! - `particle_rand(seed, frame, particle, channel) -> f32` - Per-particle random value
//!
//! ## Fixed-point codec ([`crate::codec`])
//! - `pack_position(pos: vec2<f32>) -> vec4<f32>` / `unpack_position(c) -> vec2<f32>`
//! - `pack_age(age: u32) -> vec4<f32>` / `unpack_age(c) -> u32`
//! - `unpack_wind(c: vec4<f32>) -> vec3<f32>` - `(u, v, magnitude)`, magnitude -1 when invalid

use crate::codec::AGE_SENTINEL;

/// WGSL code for random/hash functions.
pub const RANDOM_WGSL: &str = r#"
// Hash functions for pseudo-random number generation
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn hash3(p: vec3<u32>) -> u32 {
    return hash(p.x + hash(p.y + hash(p.z)));
}

// Random float in [0, 1]
fn rand(seed: u32) -> f32 {
    return f32(hash(seed)) / 4294967295.0;
}

// Channel 0/1: spawn x/y, channel 2: initial age
fn particle_rand(seed: u32, frame: u32, particle: u32, channel: u32) -> f32 {
    return rand(hash3(vec3<u32>(particle, frame, seed + channel * 0x9e3779b9u)));
}
"#;

/// WGSL code for the fixed-point texel codec.
pub const CODEC_WGSL: &str = r#"
// Fixed-point texel codec (RGBA8 unorm)
fn texel_bytes(c: vec4<f32>) -> vec4<u32> {
    return vec4<u32>(round(clamp(c, vec4<f32>(0.0), vec4<f32>(1.0)) * 255.0));
}

// 12.4 fixed point, hi/lo bytes per axis
fn pack_position(pos: vec2<f32>) -> vec4<f32> {
    let fx = u32(clamp(floor(pos.x * 16.0), 0.0, 65535.0));
    let fy = u32(clamp(floor(pos.y * 16.0), 0.0, 65535.0));
    return vec4<f32>(f32(fx >> 8u), f32(fx & 255u), f32(fy >> 8u), f32(fy & 255u)) / 255.0;
}

fn unpack_position(c: vec4<f32>) -> vec2<f32> {
    let b = texel_bytes(c);
    return vec2<f32>(f32((b.x << 8u) | b.y), f32((b.z << 8u) | b.w)) / 16.0;
}

fn pack_age(age: u32) -> vec4<f32> {
    return vec4<f32>(f32(min(age, 255u)) / 255.0, 0.0, 0.0, 0.5);
}

fn unpack_age(c: vec4<f32>) -> u32 {
    return u32(round(clamp(c.r, 0.0, 1.0) * 255.0));
}

// Offset 128, scale 16, 12 bits per component
fn unpack_wind(c: vec4<f32>) -> vec3<f32> {
    if c.a < 0.5 {
        return vec3<f32>(0.0, 0.0, -1.0);
    }
    let b = texel_bytes(c);
    let u12 = (b.x << 4u) | (b.y >> 4u);
    let v12 = ((b.y & 15u) << 8u) | b.z;
    let w = vec2<f32>(f32(u12), f32(v12)) / 16.0 - vec2<f32>(128.0);
    return vec3<f32>(w, length(w));
}
"#;

/// Constants shared between Rust and WGSL.
pub fn constants_wgsl() -> String {
    format!("const AGE_SENTINEL: u32 = {}u;\n", AGE_SENTINEL)
}

/// Get all utility functions combined.
pub fn all_utils_wgsl() -> String {
    format!(
        "// Built-in utility functions\n{}\n{}\n{}\n",
        constants_wgsl(),
        RANDOM_WGSL,
        CODEC_WGSL
    )
}
