//! Bulk image resizing for the multitool web tools.
//!
//! This crate provides:
//! - Format detection from magic bytes
//! - A registry of uploaded images with managed object URLs
//! - Shared resize settings with aspect lock
//! - Concurrent, all-or-nothing batch transcoding with JPEG fallback
//! - Staggered export of the results
//!
//! # Example
//!
//! ```no_run
//! use multitool_image::{Exporter, FileInput, MemorySink, OutputFormat, ResizeConfig, ResizeSession};
//!
//! # async fn run(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = ResizeSession::new(ResizeConfig::default(), Exporter::default());
//! session.add_file(FileInput::new("photo.png", "image/png", bytes));
//! session.set_width(400);
//! session.set_output_format(OutputFormat::WebP);
//!
//! session.process_all().await?;
//! session.export_all(&MemorySink::new()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod alpha;
pub mod batch;
pub mod config;
mod detect;
mod error;
pub mod export;
pub mod object_url;
pub mod registry;
pub mod session;
pub mod transcode;

#[cfg(test)]
mod test_support;

pub use alpha::flatten_alpha;
pub use batch::{BatchOutput, BatchProcessor, PendingBatch};
pub use config::{OutputFormat, ResizeConfig, MAX_QUALITY, MIN_QUALITY};
pub use detect::{detect_format, sniff_mime, ImageFormat, OCTET_STREAM};
pub use error::{BatchError, ImageError, Result, TranscodeError};
pub use export::{DirectorySink, DownloadSink, Exporter, MemorySink};
pub use object_url::{ObjectUrl, ObjectUrlTable};
pub use registry::{read_dimensions, Dimensions, EntryId, FileInput, ImageEntry, Registry, TranscodeJob};
pub use session::{Mode, ResizeSession};
pub use transcode::{Artifact, Encoded, Transcoder};
