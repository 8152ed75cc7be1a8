//! Software trail renderer for the CPU path.
//!
//! The canvas holds premultiplied RGBA8. Each frame the previous contents are
//! faded by multiplying every channel, then the tick's segments are stroked on
//! top. Trails are nothing more than the sum of those partial fades.

use std::path::Path;

use glam::Vec2;
use image::{ImageFormat, RgbaImage};

use crate::advector::DrawCommand;
use crate::error::TextureError;
use crate::visuals::ColorStyle;

/// Fraction of the previous frame kept by [`Canvas::fade`].
pub const FADE_RETAIN: f32 = 0.97;

/// Premultiplied RGBA8 raster.
#[derive(Clone, Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    /// A transparent canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw premultiplied pixels, row-major.
    pub fn as_raw(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at `(x, y)`, transparent outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let off = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[off],
            self.pixels[off + 1],
            self.pixels[off + 2],
            self.pixels[off + 3],
        ]
    }

    /// Reset to transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Multiply every channel by `retain`, truncating so trails reach zero.
    pub fn fade(&mut self, retain: f32) {
        let retain = retain.clamp(0.0, 1.0);
        for c in &mut self.pixels {
            *c = (*c as f32 * retain) as u8;
        }
    }

    #[inline]
    fn blend(&mut self, x: i64, y: i64, style: ColorStyle) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let off = (y as usize * self.width as usize + x as usize) * 4;
        let [r, g, b, a] = style.rgba;
        let alpha = a as f32 / 255.0;
        let inv = 1.0 - alpha;
        let px = &mut self.pixels[off..off + 4];
        px[0] = (r as f32 * alpha + px[0] as f32 * inv).round() as u8;
        px[1] = (g as f32 * alpha + px[1] as f32 * inv).round() as u8;
        px[2] = (b as f32 * alpha + px[2] as f32 * inv).round() as u8;
        px[3] = (a as f32 + px[3] as f32 * inv).round() as u8;
    }

    /// Stroke a 1 px line with Bresenham's algorithm.
    pub fn draw_line(&mut self, from: Vec2, to: Vec2, style: ColorStyle) {
        if !from.is_finite() || !to.is_finite() {
            return;
        }
        let (x0, y0) = (from.x.round() as i64, from.y.round() as i64);
        let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);

        let mut cx = x0;
        let mut cy = y0;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.blend(cx, cy, style);
            if cx == x1 && cy == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                cx += sx;
            }
            if e2 <= dx {
                err += dx;
                cy += sy;
            }
        }
    }

    /// Stroke every segment of a tick, one style per bucket.
    pub fn draw_segments(&mut self, draw: &DrawCommand) {
        for (segments, style) in draw.buckets.iter().zip(&draw.styles) {
            for segment in segments {
                self.draw_line(segment.from, segment.to, *style);
            }
        }
    }

    /// Fade the previous frame and draw a new one.
    pub fn render(&mut self, draw: &DrawCommand, retain: f32) {
        self.fade(retain);
        self.draw_segments(draw);
    }

    /// Straight-alpha copy for export.
    pub fn to_image(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for (dst, src) in img.as_mut().chunks_exact_mut(4).zip(self.pixels.chunks_exact(4)) {
            let a = src[3];
            if a == 0 {
                dst.copy_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let scale = 255.0 / a as f32;
            for i in 0..3 {
                dst[i] = (src[i] as f32 * scale).round().min(255.0) as u8;
            }
            dst[3] = a;
        }
        img
    }

    /// Write the canvas as a PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), TextureError> {
        self.to_image().save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}
