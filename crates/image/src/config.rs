//! Resize configuration shared by every entry in a batch.

use crate::registry::Dimensions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest accepted encoder quality.
pub const MIN_QUALITY: u8 = 10;
/// Highest accepted encoder quality.
pub const MAX_QUALITY: u8 = 100;

/// Encodings a batch can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy JPEG
    Jpeg,
    /// Lossless PNG; quality is ignored
    Png,
    /// WebP
    WebP,
    /// AVIF
    Avif,
}

impl OutputFormat {
    /// Every selectable format, in menu order.
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::WebP,
        OutputFormat::Avif,
    ];

    /// File extension used for exported files.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    /// MIME type of the encoded bytes.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    /// Whether the quality setting has any effect.
    pub fn uses_quality(&self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WEBP",
            OutputFormat::Avif => "AVIF",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Ok(OutputFormat::Jpeg),
            "png" | "image/png" => Ok(OutputFormat::Png),
            "webp" | "image/webp" => Ok(OutputFormat::WebP),
            "avif" | "image/avif" => Ok(OutputFormat::Avif),
            other => Err(format!("unsupported output format '{other}' (expected jpeg, png, webp or avif)")),
        }
    }
}

/// Target size, encoding and aspect-lock settings.
///
/// A zero width or height means "unset"; the first image registered into an
/// empty registry seeds both from its natural size while they are unset.
/// Edits never touch artifacts that were already produced: a batch works on
/// its own copy taken when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConfig {
    target_width: u32,
    target_height: u32,
    aspect_locked: bool,
    output_format: OutputFormat,
    quality: u8,
    jpeg_background: [u8; 3],
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            target_width: 0,
            target_height: 0,
            aspect_locked: true,
            output_format: OutputFormat::Jpeg,
            quality: 90,
            jpeg_background: [255, 255, 255],
        }
    }
}

impl ResizeConfig {
    /// Target width in pixels, 0 when unset.
    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    /// Target height in pixels, 0 when unset.
    pub fn target_height(&self) -> u32 {
        self.target_height
    }

    /// Both target dimensions, if set.
    pub fn target(&self) -> Option<Dimensions> {
        (self.target_width > 0 && self.target_height > 0)
            .then(|| Dimensions::new(self.target_width, self.target_height))
    }

    /// Whether editing one dimension recomputes the other.
    pub fn aspect_locked(&self) -> bool {
        self.aspect_locked
    }

    /// Requested output encoding.
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Encoder quality in `MIN_QUALITY..=MAX_QUALITY`.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Colour transparent pixels are flattened onto for JPEG.
    pub fn jpeg_background(&self) -> [u8; 3] {
        self.jpeg_background
    }

    /// Seed unset targets from a newly loaded image.
    ///
    /// Returns false (and changes nothing) if either target is already set.
    pub fn seed(&mut self, natural: Dimensions) -> bool {
        if self.target_width != 0 || self.target_height != 0 {
            return false;
        }
        self.target_width = natural.width;
        self.target_height = natural.height;
        true
    }

    /// Set the target width.
    ///
    /// With the aspect lock on and a `reference` image available, the height
    /// is recomputed from the reference ratio, rounding halves up. A zero
    /// width is rejected and leaves the configuration unchanged.
    pub fn set_width(&mut self, width: u32, reference: Option<Dimensions>) -> bool {
        if width == 0 {
            return false;
        }
        self.target_width = width;
        if let Some(reference) = reference.filter(|_| self.aspect_locked) {
            self.target_height = scale_round_half_up(width, reference.height, reference.width);
        }
        true
    }

    /// Set the target height; mirror image of [`ResizeConfig::set_width`].
    pub fn set_height(&mut self, height: u32, reference: Option<Dimensions>) -> bool {
        if height == 0 {
            return false;
        }
        self.target_height = height;
        if let Some(reference) = reference.filter(|_| self.aspect_locked) {
            self.target_width = scale_round_half_up(height, reference.width, reference.height);
        }
        true
    }

    /// Turn the aspect lock on or off.
    pub fn set_aspect_locked(&mut self, locked: bool) {
        self.aspect_locked = locked;
    }

    /// Switch encodings. Quality is kept even when it is ignored.
    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    /// Set the encoder quality, clamped to `MIN_QUALITY..=MAX_QUALITY`.
    pub fn set_quality(&mut self, quality: u32) {
        let clamped = quality.clamp(u32::from(MIN_QUALITY), u32::from(MAX_QUALITY));
        self.quality = clamped as u8;
    }

    /// Set the JPEG flattening background.
    pub fn set_jpeg_background(&mut self, rgb: [u8; 3]) {
        self.jpeg_background = rgb;
    }
}

/// `value * numerator / denominator`, rounded half up, never below 1.
fn scale_round_half_up(value: u32, numerator: u32, denominator: u32) -> u32 {
    let (value, numerator, denominator) = (
        u64::from(value),
        u64::from(numerator),
        u64::from(denominator.max(1)),
    );
    let scaled = (2 * value * numerator + denominator) / (2 * denominator);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}
