//! Per-image resize and re-encode.

use crate::alpha::flatten_alpha;
use crate::config::{OutputFormat, ResizeConfig};
use crate::error::TranscodeError;
use crate::object_url::{ObjectUrl, ObjectUrlTable};
use crate::registry::{Dimensions, EntryId, TranscodeJob};
use crate::{ImageError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use multitool_telemetry::{metrics, names};
use std::sync::Arc;

/// Encoded output of one entry.
#[derive(Debug)]
pub struct Artifact {
    url: ObjectUrl,
    bytes: Arc<[u8]>,
    dimensions: Dimensions,
    requested: OutputFormat,
    format: OutputFormat,
}

impl Artifact {
    pub(crate) fn new(
        urls: &ObjectUrlTable,
        encoded: Encoded,
        dimensions: Dimensions,
        requested: OutputFormat,
    ) -> Self {
        let bytes: Arc<[u8]> = Arc::from(encoded.bytes);
        Self {
            url: urls.create(Arc::clone(&bytes)),
            bytes,
            dimensions,
            requested,
            format: encoded.format,
        }
    }

    /// URL the encoded bytes are published under.
    pub fn url(&self) -> &ObjectUrl {
        &self.url
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the encoder produced no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Exact size the image was drawn at.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Encoding the batch asked for.
    pub fn requested_format(&self) -> OutputFormat {
        self.requested
    }

    /// Encoding actually produced.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// True when the requested encoding was unavailable and JPEG was used.
    pub fn is_fallback(&self) -> bool {
        self.format != self.requested
    }
}

/// Raw encoder output before it is published.
#[derive(Debug)]
pub struct Encoded {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// Encoding actually produced
    pub format: OutputFormat,
}

/// Turns one source image into one artifact.
#[derive(Debug, Clone)]
pub struct Transcoder {
    urls: ObjectUrlTable,
}

impl Transcoder {
    /// Create a transcoder publishing artifacts into `urls`.
    pub fn new(urls: ObjectUrlTable) -> Self {
        Self { urls }
    }

    /// Decode, stretch to the configured target and encode.
    ///
    /// Decoding and encoding run on the blocking pool; the caller suspends
    /// until both finish. `config` is the snapshot taken when the batch
    /// started.
    pub async fn transcode(
        &self,
        job: TranscodeJob,
        config: ResizeConfig,
    ) -> std::result::Result<Artifact, TranscodeError> {
        let TranscodeJob { id, name, source } = job;
        let requested = config.output_format();

        let outcome = tokio::task::spawn_blocking(move || render(&source, &config))
            .await
            .map_err(|e| ImageError::Worker(e.to_string()))
            .and_then(|rendered| rendered);

        match outcome {
            Ok((encoded, dimensions)) => {
                tracing::debug!(
                    %id,
                    name = %name,
                    size = %dimensions,
                    format = %encoded.format,
                    bytes = encoded.bytes.len(),
                    "transcoded"
                );
                Ok(Artifact::new(&self.urls, encoded, dimensions, requested))
            }
            Err(source) => Err(failure(id, name, source)),
        }
    }
}

fn failure(id: EntryId, name: String, source: ImageError) -> TranscodeError {
    tracing::debug!(%id, name = %name, error = %source, "transcode failed");
    TranscodeError { id, name, source }
}

/// Decode `source` and draw it at exactly the configured target size.
///
/// No letterboxing or cropping: the image is stretched to fill the target.
pub fn render(source: &[u8], config: &ResizeConfig) -> Result<(Encoded, Dimensions)> {
    let target = config.target().ok_or(ImageError::MissingTarget)?;
    let decoded =
        image::load_from_memory(source).map_err(|e| ImageError::Decode(e.to_string()))?;

    let drawn = if decoded.width() == target.width && decoded.height() == target.height {
        decoded
    } else {
        decoded.resize_exact(target.width, target.height, FilterType::Triangle)
    };

    Ok((encode(&drawn, config)?, target))
}

/// Encode with the configured format, falling back to JPEG when the encoder
/// does not support it.
pub fn encode(img: &DynamicImage, config: &ResizeConfig) -> Result<Encoded> {
    let requested = config.output_format();
    match encode_as(img, requested, config) {
        Ok(bytes) => Ok(Encoded { bytes, format: requested }),
        Err(ImageError::Encode { format, reason }) => {
            tracing::warn!(%format, %reason, "encoder unavailable, falling back to JPEG");
            metrics().increment(names::FALLBACK_JPEG);
            let bytes = encode_as(img, OutputFormat::Jpeg, config)?;
            Ok(Encoded { bytes, format: OutputFormat::Jpeg })
        }
        Err(e) => Err(e),
    }
}

fn encode_as(img: &DynamicImage, format: OutputFormat, config: &ResizeConfig) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let flat = DynamicImage::ImageRgb8(flatten_alpha(img, config.jpeg_background()));
            flat.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, config.quality()))?;
        }
        OutputFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut buffer))?;
        }
        OutputFormat::WebP => buffer = encode_webp(img, config)?,
        OutputFormat::Avif => encode_avif(img, &mut buffer, config)?,
    }

    Ok(buffer)
}

/// Lossy WebP at the configured quality via libwebp.
fn encode_webp(img: &DynamicImage, config: &ResizeConfig) -> Result<Vec<u8>> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    let encoded = encoder
        .encode_simple(false, f32::from(config.quality()))
        .map_err(|e| ImageError::Encode {
            format: OutputFormat::WebP,
            reason: format!("{e:?}"),
        })?;
    Ok(encoded.to_vec())
}

#[cfg(feature = "avif")]
fn encode_avif(img: &DynamicImage, buffer: &mut Vec<u8>, config: &ResizeConfig) -> Result<()> {
    use image::codecs::avif::AvifEncoder;

    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(buffer, 8, config.quality()))
        .map_err(|e| unsupported(OutputFormat::Avif, e))
}

#[cfg(not(feature = "avif"))]
fn encode_avif(_img: &DynamicImage, _buffer: &mut Vec<u8>, _config: &ResizeConfig) -> Result<()> {
    Err(ImageError::Encode {
        format: OutputFormat::Avif,
        reason: "AVIF encoding is not compiled in".to_string(),
    })
}

/// Map encoder capability errors to [`ImageError::Encode`]; pass the rest through.
#[cfg(feature = "avif")]
fn unsupported(format: OutputFormat, err: image::ImageError) -> ImageError {
    match err {
        image::ImageError::Unsupported(e) => ImageError::Encode {
            format,
            reason: e.to_string(),
        },
        other => ImageError::ProcessingError(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{corrupt_png_bytes, png_bytes, rgba_png_bytes};

    fn config(width: u32, height: u32, format: OutputFormat, quality: u32) -> ResizeConfig {
        let mut config = ResizeConfig::default();
        config.set_aspect_locked(false);
        config.set_width(width, None);
        config.set_height(height, None);
        config.set_output_format(format);
        config.set_quality(quality);
        config
    }

    fn job(source: Vec<u8>) -> TranscodeJob {
        TranscodeJob {
            id: EntryId::new(),
            name: "fixture.png".into(),
            source: Arc::from(source),
        }
    }

    #[test]
    fn test_render_stretches_to_target() {
        let source = png_bytes(40, 10);
        let (encoded, dims) = render(&source, &config(7, 33, OutputFormat::Png, 90)).unwrap();

        assert_eq!(dims, Dimensions::new(7, 33));
        let decoded = image::load_from_memory(&encoded.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 33));
    }

    #[test]
    fn test_png_ignores_quality() {
        let source = png_bytes(32, 32);
        let (low, _) = render(&source, &config(16, 16, OutputFormat::Png, 10)).unwrap();
        let (high, _) = render(&source, &config(16, 16, OutputFormat::Png, 100)).unwrap();
        assert_eq!(low.bytes, high.bytes);
    }

    #[test]
    fn test_jpeg_quality_changes_output() {
        let source = png_bytes(64, 64);
        let (low, _) = render(&source, &config(64, 64, OutputFormat::Jpeg, 10)).unwrap();
        let (high, _) = render(&source, &config(64, 64, OutputFormat::Jpeg, 100)).unwrap();

        assert_eq!(low.format, OutputFormat::Jpeg);
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn test_transparent_source_encodes_as_jpeg() {
        let source = rgba_png_bytes(8, 8, [0, 0, 0, 0]);
        let (encoded, _) = render(&source, &config(8, 8, OutputFormat::Jpeg, 90)).unwrap();
        let decoded = image::load_from_memory_with_format(&encoded.bytes, image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        // flattened onto the default white background
        assert!(decoded.pixels().all(|p| p.0.iter().all(|&c| c > 240)));
    }

    #[test]
    fn test_webp_output() {
        let source = png_bytes(20, 20);
        let (encoded, _) = render(&source, &config(10, 10, OutputFormat::WebP, 80)).unwrap();
        assert_eq!(encoded.format, OutputFormat::WebP);
        assert_eq!(&encoded.bytes[8..12], b"WEBP");
        let decoded = image::load_from_memory_with_format(&encoded.bytes, image::ImageFormat::WebP)
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn test_webp_quality_changes_output() {
        let source = png_bytes(64, 64);
        let (low, _) = render(&source, &config(64, 64, OutputFormat::WebP, 10)).unwrap();
        let (high, _) = render(&source, &config(64, 64, OutputFormat::WebP, 100)).unwrap();

        assert_eq!(low.format, OutputFormat::WebP);
        assert_eq!(high.format, OutputFormat::WebP);
        assert_ne!(low.bytes, high.bytes);
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[cfg(not(feature = "avif"))]
    #[test]
    fn test_unsupported_format_falls_back_to_jpeg() {
        let source = png_bytes(30, 20);
        let (encoded, dims) = render(&source, &config(15, 10, OutputFormat::Avif, 70)).unwrap();

        assert_eq!(encoded.format, OutputFormat::Jpeg);
        assert!(encoded.bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
        let decoded = image::load_from_memory_with_format(&encoded.bytes, image::ImageFormat::Jpeg)
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (dims.width, dims.height));
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let result = render(&png_bytes(4, 4), &ResizeConfig::default());
        assert!(matches!(result, Err(ImageError::MissingTarget)));
    }

    #[tokio::test]
    async fn test_transcode_publishes_artifact() {
        let urls = ObjectUrlTable::new();
        let transcoder = Transcoder::new(urls.clone());

        let artifact = transcoder
            .transcode(job(png_bytes(12, 12)), config(6, 6, OutputFormat::Png, 90))
            .await
            .unwrap();

        assert!(!artifact.is_empty());
        assert!(!artifact.is_fallback());
        assert_eq!(artifact.dimensions(), Dimensions::new(6, 6));
        assert_eq!(&*artifact.url().bytes().unwrap(), artifact.bytes());
        assert_eq!(urls.outstanding(), 1);

        drop(artifact);
        assert_eq!(urls.outstanding(), 0);
    }

    #[cfg(not(feature = "avif"))]
    #[tokio::test]
    async fn test_transcode_records_fallback() {
        let transcoder = Transcoder::new(ObjectUrlTable::new());
        let artifact = transcoder
            .transcode(job(png_bytes(12, 12)), config(6, 6, OutputFormat::Avif, 90))
            .await
            .unwrap();

        assert!(artifact.is_fallback());
        assert_eq!(artifact.requested_format(), OutputFormat::Avif);
        assert_eq!(artifact.format(), OutputFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_corrupt_source_names_entry() {
        let urls = ObjectUrlTable::new();
        let transcoder = Transcoder::new(urls.clone());
        let job = job(corrupt_png_bytes(32, 32));
        let id = job.id;

        let err = transcoder
            .transcode(job, config(8, 8, OutputFormat::Png, 90))
            .await
            .unwrap_err();

        assert_eq!(err.id, id);
        assert!(matches!(err.source, ImageError::Decode(_)));
        assert_eq!(urls.outstanding(), 0);
    }
}
