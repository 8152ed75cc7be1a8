//! Color styles for particle trails.
//!
//! Particles are grouped into color buckets by intensity each tick so a
//! renderer can draw every segment of one bucket with a single stroke style.
//!
//! # Example
//!
//! ```ignore
//! // Grey ramp from 85 to 255 in steps of 10, saturating at 17 m/s
//! let buckets = ColorBuckets::intensity_scale(10, 17.0);
//! let i = buckets.index_for(8.5);
//! let style = buckets.style(i);
//! ```

use glam::Vec3;

/// Predefined color palettes for mapping intensity to color.
///
/// Each palette is defined by 5 color stops sampled with linear
/// interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Palette {
    /// Viridis - perceptually uniform, colorblind-friendly (purple to yellow).
    Viridis,

    /// Magma - perceptually uniform (black to yellow through red).
    Magma,

    /// Inferno - perceptually uniform (black to yellow through red/orange).
    Inferno,

    /// Ocean - cool blues and teals.
    Ocean,

    /// Ice - white through light blue to deep blue.
    Ice,

    /// Grayscale - black to white.
    #[default]
    Grayscale,
}

impl Palette {
    /// Get the color stops for this palette (5 colors).
    pub fn colors(&self) -> [Vec3; 5] {
        match self {
            Palette::Viridis => [
                Vec3::new(0.267, 0.004, 0.329), // Dark purple
                Vec3::new(0.282, 0.140, 0.458), // Purple
                Vec3::new(0.127, 0.566, 0.551), // Teal
                Vec3::new(0.369, 0.789, 0.383), // Green
                Vec3::new(0.993, 0.906, 0.144), // Yellow
            ],
            Palette::Magma => [
                Vec3::new(0.001, 0.0, 0.014),   // Black
                Vec3::new(0.329, 0.071, 0.435), // Purple
                Vec3::new(0.716, 0.215, 0.475), // Pink
                Vec3::new(0.994, 0.541, 0.380), // Orange
                Vec3::new(0.987, 0.991, 0.749), // Light yellow
            ],
            Palette::Inferno => [
                Vec3::new(0.001, 0.0, 0.014),   // Black
                Vec3::new(0.341, 0.063, 0.429), // Purple
                Vec3::new(0.735, 0.216, 0.330), // Red
                Vec3::new(0.988, 0.645, 0.198), // Orange
                Vec3::new(0.988, 1.0, 0.644),   // Light yellow
            ],
            Palette::Ocean => [
                Vec3::new(0.0, 0.05, 0.15), // Deep blue
                Vec3::new(0.0, 0.2, 0.4),   // Dark blue
                Vec3::new(0.0, 0.4, 0.6),   // Blue
                Vec3::new(0.2, 0.6, 0.8),   // Light blue
                Vec3::new(0.6, 0.9, 1.0),   // Cyan
            ],
            Palette::Ice => [
                Vec3::new(1.0, 1.0, 1.0), // White
                Vec3::new(0.8, 0.9, 1.0), // Light blue
                Vec3::new(0.4, 0.7, 1.0), // Blue
                Vec3::new(0.1, 0.4, 0.8), // Medium blue
                Vec3::new(0.0, 0.1, 0.4), // Dark blue
            ],
            Palette::Grayscale => [
                Vec3::new(0.0, 0.0, 0.0), // Black
                Vec3::new(0.25, 0.25, 0.25),
                Vec3::new(0.5, 0.5, 0.5),
                Vec3::new(0.75, 0.75, 0.75),
                Vec3::new(1.0, 1.0, 1.0), // White
            ],
        }
    }

    /// Sample the palette at `t` in `[0, 1]`.
    pub fn sample(&self, t: f32) -> Vec3 {
        let stops = self.colors();
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let scaled = t * (stops.len() - 1) as f32;
        let i = (scaled.floor() as usize).min(stops.len() - 2);
        stops[i].lerp(stops[i + 1], scaled - i as f32)
    }
}

/// One stroke style: an opaque-by-default RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorStyle {
    pub rgba: [u8; 4],
}

impl ColorStyle {
    /// Opaque grey of the given level.
    pub fn grey(level: u8) -> Self {
        Self {
            rgba: [level, level, level, 255],
        }
    }

    /// Opaque color from linear `[0, 1]` components.
    pub fn from_rgb(rgb: Vec3) -> Self {
        let c = (rgb.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
        Self {
            rgba: [c.x as u8, c.y as u8, c.z as u8, 255],
        }
    }

    /// Normalized `[r, g, b, a]` for GPU uniforms.
    pub fn to_unorm(&self) -> [f32; 4] {
        self.rgba.map(|c| c as f32 / 255.0)
    }
}

/// Ordered color styles plus the intensity → bucket mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBuckets {
    styles: Vec<ColorStyle>,
    max_intensity: f32,
}

impl ColorBuckets {
    /// Grey ramp from level 85 to 255 in steps of `step`.
    pub fn intensity_scale(step: u8, max_intensity: f32) -> Self {
        let step = step.max(1) as usize;
        let styles = (85..=255u32)
            .step_by(step)
            .map(|level| ColorStyle::grey(level as u8))
            .collect();
        Self::from_styles(styles, max_intensity)
    }

    /// `count` styles sampled evenly across a palette.
    pub fn from_palette(palette: Palette, count: usize, max_intensity: f32) -> Self {
        let count = count.max(1);
        let styles = (0..count)
            .map(|i| {
                let t = if count == 1 { 1.0 } else { i as f32 / (count - 1) as f32 };
                ColorStyle::from_rgb(palette.sample(t))
            })
            .collect();
        Self::from_styles(styles, max_intensity)
    }

    /// Use explicit styles.
    ///
    /// # Panics
    ///
    /// Panics if `styles` is empty.
    pub fn from_styles(styles: Vec<ColorStyle>, max_intensity: f32) -> Self {
        assert!(!styles.is_empty(), "At least one color style is required");
        Self {
            styles,
            max_intensity: if max_intensity > 0.0 { max_intensity } else { 1.0 },
        }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// All styles in bucket order.
    pub fn styles(&self) -> &[ColorStyle] {
        &self.styles
    }

    /// Style of bucket `index`, clamped to the last bucket.
    pub fn style(&self, index: usize) -> ColorStyle {
        self.styles[index.min(self.styles.len() - 1)]
    }

    /// Intensity at which the last bucket is reached.
    pub fn max_intensity(&self) -> f32 {
        self.max_intensity
    }

    /// Bucket for an intensity, clamped to `[0, max_intensity]`.
    pub fn index_for(&self, magnitude: f32) -> usize {
        if !magnitude.is_finite() || magnitude <= 0.0 {
            return 0;
        }
        let t = magnitude.min(self.max_intensity) / self.max_intensity;
        (t * (self.styles.len() - 1) as f32).floor() as usize
    }
}
