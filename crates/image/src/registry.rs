//! Registered source images, in insertion order.

use crate::object_url::{ObjectUrl, ObjectUrlTable};
use crate::transcode::Artifact;
use crate::{detect, ImageError, Result};
use multitool_telemetry::{metrics, names};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque identifier assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryId(Uuid);

impl EntryId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Dimensions {
    /// Creates a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw file content as it arrives from a picker, drop target or disk.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Original file name
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    /// File content
    pub bytes: Vec<u8>,
}

impl FileInput {
    /// Wrap bytes with a declared name and MIME type.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, declaring its MIME type from its magic bytes.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = detect::sniff_mime(&bytes);
        Ok(Self::new(name, mime_type, bytes))
    }

    /// Whether the declared MIME type is an image type.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// One registered source image plus its processing state.
#[derive(Debug)]
pub struct ImageEntry {
    id: EntryId,
    name: String,
    byte_size: usize,
    natural: Dimensions,
    source: Arc<[u8]>,
    preview: ObjectUrl,
    artifact: Option<Artifact>,
}

impl ImageEntry {
    /// Stable identifier.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Original file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the original file in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Size the source decoded to.
    pub fn natural(&self) -> Dimensions {
        self.natural
    }

    /// URL of the original bytes, for previews.
    pub fn preview_url(&self) -> &ObjectUrl {
        &self.preview
    }

    /// Output of the most recent successful batch, if any.
    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    fn job(&self) -> TranscodeJob {
        TranscodeJob {
            id: self.id,
            name: self.name.clone(),
            source: Arc::clone(&self.source),
        }
    }
}

/// Everything a transcode needs from an entry, detached from the registry.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Entry the result belongs to
    pub id: EntryId,
    /// Entry display name
    pub name: String,
    /// Original file bytes
    pub source: Arc<[u8]>,
}

/// Ordered set of registered images.
#[derive(Debug)]
pub struct Registry {
    urls: ObjectUrlTable,
    entries: Vec<ImageEntry>,
    reference: Option<Dimensions>,
}

impl Registry {
    /// Create an empty registry publishing previews into `urls`.
    pub fn new(urls: ObjectUrlTable) -> Self {
        Self {
            urls,
            entries: Vec::new(),
            reference: None,
        }
    }

    /// Decode and append a file.
    ///
    /// Files that do not decode are dropped without an error; filter by MIME
    /// type beforehand when that matters. The first image registered into an
    /// empty registry becomes the aspect-lock reference.
    pub fn register(&mut self, file: FileInput) -> Option<EntryId> {
        let entry = self.load(file)?;
        Some(self.insert(entry))
    }

    /// Decode a file and, only if that succeeds, make it the sole entry.
    ///
    /// A file that does not decode leaves the registry untouched.
    pub fn replace(&mut self, file: FileInput) -> Option<EntryId> {
        let entry = self.load(file)?;
        self.clear();
        Some(self.insert(entry))
    }

    fn load(&self, file: FileInput) -> Option<ImageEntry> {
        let natural = match read_dimensions(&file.bytes) {
            Ok(natural) => natural,
            Err(e) => {
                tracing::debug!(name = %file.name, error = %e, "dropping undecodable file");
                metrics().increment(names::IMAGES_DROPPED);
                return None;
            }
        };

        let byte_size = file.bytes.len();
        let source: Arc<[u8]> = Arc::from(file.bytes);
        Some(ImageEntry {
            id: EntryId::new(),
            name: file.name,
            byte_size,
            natural,
            preview: self.urls.create(Arc::clone(&source)),
            source,
            artifact: None,
        })
    }

    fn insert(&mut self, entry: ImageEntry) -> EntryId {
        let id = entry.id;
        if self.entries.is_empty() {
            self.reference = Some(entry.natural);
        }
        tracing::debug!(%id, name = %entry.name, size = %entry.natural, "registered image");
        metrics().increment(names::IMAGES_REGISTERED);
        self.entries.push(entry);
        id
    }

    /// Remove an entry, revoking its URLs. Returns false if `id` is unknown.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        self.entries.remove(index);
        if self.entries.is_empty() {
            self.reference = None;
        }
        true
    }

    /// Remove every entry, revoking all URLs.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reference = None;
    }

    /// Natural size of the image that was first registered since the
    /// registry was last empty.
    pub fn reference(&self) -> Option<Dimensions> {
        self.reference
    }

    /// Look up an entry.
    pub fn get(&self, id: EntryId) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detached copies of every entry, for a batch to work on.
    pub fn snapshot(&self) -> Vec<TranscodeJob> {
        self.entries.iter().map(ImageEntry::job).collect()
    }

    /// Store batch results on their entries.
    ///
    /// Results for entries removed since the batch started are discarded.
    /// A replaced artifact is released.
    pub fn commit(&mut self, results: Vec<(EntryId, Artifact)>) {
        for (id, artifact) in results {
            match self.entries.iter_mut().find(|e| e.id == id) {
                Some(entry) => entry.artifact = Some(artifact),
                None => tracing::debug!(%id, "discarding artifact for removed entry"),
            }
        }
    }
}

/// Read the natural size of an image without a full decode.
pub fn read_dimensions(bytes: &[u8]) -> Result<Dimensions> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    if reader.format().is_none() {
        return Err(ImageError::UnknownFormat);
    }

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    if width == 0 || height == 0 {
        return Err(ImageError::InvalidData(format!("empty image {width}x{height}")));
    }

    Ok(Dimensions::new(width, height))
}
