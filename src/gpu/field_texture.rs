//! Dense field encoded as an RGBA8 wind texture.
//!
//! The dense field stores its vectors column by column, and the texture keeps
//! that order as its rows. The texture is therefore the transpose of the
//! screen region: it is `height` texels wide and `width` texels tall, and the
//! logical sample `(x, y)` lives at texel `(y, x)`. Every lookup must swap the
//! axes.

use std::path::Path;

use glam::Vec2;
use image::{ImageFormat, RgbaImage};
use log::debug;

use crate::codec::{self, WindSample};
use crate::error::{GpuError, TextureError};
use crate::field::{Bounds, DenseField, FieldConfig};
use crate::grid::VectorGrid;
use crate::projection::{Mask, Projection};
use crate::sampler::build_field;

use super::GpuContext;

/// Encoded wind texture covering a screen rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTexture {
    bounds: Bounds,
    bytes: Vec<u8>,
}

impl FieldTexture {
    /// Encode a dense field. `None` when the field covers nothing.
    pub fn encode(field: &DenseField) -> Option<Self> {
        let bounds = field.bounds()?;
        let bytes = field
            .columns()
            .iter()
            .flat_map(codec::pack_vector_bytes)
            .collect();
        debug!("Encoded field texture {}x{} (transposed)", bounds.height, bounds.width);
        Some(Self { bounds, bytes })
    }

    /// Screen region covered.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Screen position of logical sample `(0, 0)`.
    pub fn origin(&self) -> Vec2 {
        Vec2::new(self.bounds.x as f32, self.bounds.y as f32)
    }

    /// Logical `(width, height)` of the screen region.
    pub fn logical_size(&self) -> (u32, u32) {
        (self.bounds.width as u32, self.bounds.height as u32)
    }

    /// `(width, height)` of the texture: the logical size swapped.
    pub fn texture_size(&self) -> (u32, u32) {
        (self.bounds.height as u32, self.bounds.width as u32)
    }

    /// Raw RGBA8 rows, ready for upload.
    pub fn to_rgba8(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes of texture texel `(tx, ty)`.
    pub fn texel(&self, tx: u32, ty: u32) -> [u8; 4] {
        let (tw, _) = self.texture_size();
        let off = (ty as usize * tw as usize + tx as usize) * 4;
        [self.bytes[off], self.bytes[off + 1], self.bytes[off + 2], self.bytes[off + 3]]
    }

    /// Wind at a logical sample, invalid outside the region.
    pub fn wind_at_sample(&self, x: i32, y: i32) -> WindSample {
        let (w, h) = self.logical_size();
        if x < 0 || y < 0 || x as u32 >= w || y as u32 >= h {
            return WindSample::INVALID;
        }
        codec::unpack_wind_bytes(self.texel(y as u32, x as u32))
    }

    /// Wind at a screen position, rounding half up like the evolver shader.
    pub fn wind_at(&self, pos: Vec2) -> WindSample {
        if !pos.is_finite() {
            return WindSample::INVALID;
        }
        let local = (pos - self.origin() + Vec2::splat(0.5)).floor();
        self.wind_at_sample(local.x as i32, local.y as i32)
    }

    /// Copy as an image with the texture's (transposed) dimensions.
    pub fn to_image(&self) -> RgbaImage {
        let (tw, th) = self.texture_size();
        RgbaImage::from_fn(tw, th, |x, y| image::Rgba(self.texel(x, y)))
    }

    /// Save the encoded texture as a PNG.
    pub fn to_png(&self, path: impl AsRef<Path>) -> Result<(), TextureError> {
        self.to_image().save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Load a texture written by [`to_png`](Self::to_png) for `bounds`.
    pub fn from_png(path: impl AsRef<Path>, bounds: Bounds) -> Result<Self, TextureError> {
        let bytes = std::fs::read(path)?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.into_rgba8();
        let expected = (bounds.height.max(0) as u32, bounds.width.max(0) as u32);
        if img.dimensions() != expected {
            return Err(TextureError::Dimensions {
                expected,
                actual: img.dimensions(),
            });
        }
        Ok(Self {
            bounds,
            bytes: img.into_raw(),
        })
    }

    /// Create a sampled GPU texture holding this field.
    pub fn upload(&self, ctx: &GpuContext) -> Result<wgpu::Texture, GpuError> {
        let (tw, th) = self.texture_size();
        let texture = ctx.create_texture(
            "Field Texture",
            tw,
            th,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        )?;
        ctx.write_texture(&texture, tw, th, &self.bytes);
        Ok(texture)
    }
}

/// Sample the grid and encode the result as a field texture.
pub fn encode_field_texture(
    projection: &dyn Projection,
    grid: &dyn VectorGrid,
    mask: &dyn Mask,
    bounds: Bounds,
    config: &FieldConfig,
) -> Option<FieldTexture> {
    FieldTexture::encode(&build_field(projection, grid, mask, bounds, config))
}
