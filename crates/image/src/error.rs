//! Error types for the image pipeline.

use crate::config::OutputFormat;
use crate::registry::EntryId;
use thiserror::Error;

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur while decoding, encoding or exporting a single image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Unknown image format
    #[error("Unknown image format")]
    UnknownFormat,

    /// Invalid image data
    #[error("Invalid image data: {0}")]
    InvalidData(String),

    /// Source bytes could not be decoded as an image
    #[error("Decode error: {0}")]
    Decode(String),

    /// The encoder cannot produce the requested format
    #[error("Cannot encode {format}: {reason}")]
    Encode {
        /// Requested output format
        format: OutputFormat,
        /// Encoder message
        reason: String,
    },

    /// Target width or height is still unset
    #[error("Target dimensions are not set")]
    MissingTarget,

    /// Background worker failed before producing a result
    #[error("Worker failed: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    ProcessingError(#[from] image::ImageError),
}

/// A registered entry could not be turned into an artifact.
#[derive(Debug, Error)]
#[error("Failed to transcode {name} ({id}): {source}")]
pub struct TranscodeError {
    /// Entry that failed
    pub id: EntryId,
    /// Display name of the entry
    pub name: String,
    /// Underlying cause
    #[source]
    pub source: ImageError,
}

/// Batch-level failures.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A previous batch has not settled yet
    #[error("A batch is already processing")]
    AlreadyProcessing,

    /// Target width or height is still unset
    #[error("Target dimensions are not set")]
    MissingTarget,

    /// One or more entries failed; nothing from the batch is committed
    #[error("{} of {total} images failed to process", failures.len())]
    Failed {
        /// Per-entry failures, in registry order
        failures: Vec<TranscodeError>,
        /// Number of entries in the batch
        total: usize,
    },
}
