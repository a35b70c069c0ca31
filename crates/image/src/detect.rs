//! Image format detection from magic bytes.
//!
//! Used at the inbound boundary to declare a MIME type for raw bytes whose
//! origin did not supply one (files read from disk, pasted buffers).

use crate::{ImageError, Result};

/// Formats recognised at the inbound boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// GIF image
    Gif,
    /// WebP image
    WebP,
    /// AVIF image
    Avif,
    /// BMP image
    Bmp,
    /// TIFF image
    Tiff,
    /// HEIC/HEIF image
    Heic,
}

/// MIME type declared for bytes that are not a recognised image.
pub const OCTET_STREAM: &str = "application/octet-stream";

impl ImageFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Heic => "image/heic",
        }
    }

    /// Get common file extensions for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg"],
            ImageFormat::Png => &["png"],
            ImageFormat::Gif => &["gif"],
            ImageFormat::WebP => &["webp"],
            ImageFormat::Avif => &["avif"],
            ImageFormat::Bmp => &["bmp"],
            ImageFormat::Tiff => &["tiff", "tif"],
            ImageFormat::Heic => &["heic", "heif"],
        }
    }
}

/// Leading signatures, checked in order.
const SIGNATURES: &[(&[u8], ImageFormat)] = &[
    (&[0xFF, 0xD8, 0xFF], ImageFormat::Jpeg),
    (&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], ImageFormat::Png),
    (b"GIF87a", ImageFormat::Gif),
    (b"GIF89a", ImageFormat::Gif),
    (&[0x49, 0x49, 0x2A, 0x00], ImageFormat::Tiff),
    (&[0x4D, 0x4D, 0x00, 0x2A], ImageFormat::Tiff),
    (b"BM", ImageFormat::Bmp),
];

/// Detect image format from magic bytes.
///
/// # Arguments
/// * `data` - First few bytes of the image file (at least 12 bytes recommended)
///
/// # Example
/// ```
/// use multitool_image::{detect_format, ImageFormat};
///
/// let png_data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// assert!(matches!(detect_format(&png_data), Ok(ImageFormat::Png)));
/// ```
pub fn detect_format(data: &[u8]) -> Result<ImageFormat> {
    if data.len() < 4 {
        return Err(ImageError::InvalidData("Not enough data for format detection".into()));
    }

    if let Some((_, format)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return Ok(*format);
    }

    if data.len() >= 12 {
        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Ok(ImageFormat::WebP);
        }

        // ISO-BMFF: ....ftyp<brand>
        if &data[4..8] == b"ftyp" {
            match &data[8..12] {
                b"avif" | b"avis" => return Ok(ImageFormat::Avif),
                b"heic" | b"heix" | b"mif1" | b"msf1" => return Ok(ImageFormat::Heic),
                _ => {}
            }
        }
    }

    Err(ImageError::UnknownFormat)
}

/// MIME type to declare for `data`, falling back to [`OCTET_STREAM`].
pub fn sniff_mime(data: &[u8]) -> &'static str {
    detect_format(data).map_or(OCTET_STREAM, |format| format.mime_type())
}
