//! Error types for windtrail.
//!
//! Only resource creation on the GPU path and field texture file I/O can fail.
//! Missing data, projection singularities and absent collaborators are not
//! errors: they surface as null vectors or an empty [`DenseField`](crate::DenseField).

use std::fmt;

/// Errors that can occur while creating GPU resources.
///
/// Any of these means the GPU path is unavailable; callers are expected to
/// fall back to the CPU [`Advector`](crate::Advector).
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// A requested texture exceeds the device limit.
    TextureTooLarge {
        /// Requested edge length in texels.
        requested: u32,
        /// Largest edge length the device supports.
        max: u32,
    },
    /// Shader or pipeline creation was rejected by the device.
    Validation(String),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => {
                write!(f, "No compatible GPU adapter found. Fall back to the CPU advector.")
            }
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::TextureTooLarge { requested, max } => write!(
                f,
                "Texture of {} texels per side exceeds device limit of {}",
                requested, max
            ),
            GpuError::Validation(msg) => write!(f, "GPU validation failed: {}", msg),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur when saving or loading an encoded field texture.
#[derive(Debug)]
pub enum TextureError {
    /// Failed to encode or decode the image.
    ImageLoad(image::ImageError),
    /// Failed to read or write the file.
    Io(std::io::Error),
    /// Image size does not match the logical field size.
    Dimensions {
        /// Expected `(width, height)` in texels.
        expected: (u32, u32),
        /// Actual `(width, height)` of the image.
        actual: (u32, u32),
    },
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::ImageLoad(e) => write!(f, "Failed to process field image: {}", e),
            TextureError::Io(e) => write!(f, "Failed to access field texture file: {}", e),
            TextureError::Dimensions { expected, actual } => write!(
                f,
                "Field texture is {}x{}, expected {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for TextureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TextureError::ImageLoad(e) => Some(e),
            TextureError::Io(e) => Some(e),
            TextureError::Dimensions { .. } => None,
        }
    }
}

impl From<image::ImageError> for TextureError {
    fn from(e: image::ImageError) -> Self {
        TextureError::ImageLoad(e)
    }
}

impl From<std::io::Error> for TextureError {
    fn from(e: std::io::Error) -> Self {
        TextureError::Io(e)
    }
}
