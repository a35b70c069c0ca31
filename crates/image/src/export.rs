//! Turning artifacts into downloads.

use crate::registry::ImageEntry;
use crate::transcode::Artifact;
use crate::Result;
use multitool_telemetry::{metrics, names};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default suffix appended to the original file stem.
pub const DEFAULT_SUFFIX: &str = "_resized";

/// Default pause between downloads in a bulk export.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(300);

/// Receives user-visible saves.
pub trait DownloadSink {
    /// Save `artifact` under `filename`.
    fn save(&self, filename: &str, artifact: &Artifact) -> Result<()>;
}

/// Writes downloads into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, filename: &str, artifact: &Artifact) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        std::fs::write(&path, artifact.bytes())?;
        tracing::debug!(path = %path.display(), bytes = artifact.len(), "saved artifact");
        Ok(())
    }
}

/// Keeps downloads in memory, in trigger order.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, Vec<u8>)>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything saved so far.
    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().clone()
    }

    /// File names saved so far.
    pub fn filenames(&self) -> Vec<String> {
        self.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

impl DownloadSink for MemorySink {
    fn save(&self, filename: &str, artifact: &Artifact) -> Result<()> {
        self.lock().push((filename.to_string(), artifact.bytes().to_vec()));
        Ok(())
    }
}

/// Names and triggers downloads for processed entries.
#[derive(Debug, Clone)]
pub struct Exporter {
    suffix: String,
    stagger: Duration,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX, DEFAULT_STAGGER)
    }
}

impl Exporter {
    /// Exporter appending `suffix` to file stems and pausing `stagger`
    /// between bulk downloads.
    pub fn new(suffix: impl Into<String>, stagger: Duration) -> Self {
        Self {
            suffix: suffix.into(),
            stagger,
        }
    }

    /// Pause between downloads in [`Exporter::export_all`].
    pub fn stagger(&self) -> Duration {
        self.stagger
    }

    /// Download name for an entry's artifact: original stem, suffix, and the
    /// extension of the encoding actually produced.
    pub fn filename_for(&self, entry: &ImageEntry) -> Option<String> {
        let artifact = entry.artifact()?;
        let stem = Path::new(entry.name())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "image".to_string());
        Some(format!("{stem}{}.{}", self.suffix, artifact.format().extension()))
    }

    /// Save one entry's artifact. Returns false if it has none.
    pub fn export_one(&self, entry: &ImageEntry, sink: &dyn DownloadSink) -> Result<bool> {
        let (Some(artifact), Some(filename)) = (entry.artifact(), self.filename_for(entry)) else {
            return Ok(false);
        };
        sink.save(&filename, artifact)?;
        metrics().increment(names::EXPORTS);
        Ok(true)
    }

    /// Save every artifact in order, pausing between downloads.
    ///
    /// Entries without an artifact are skipped and do not add a pause.
    pub async fn export_all<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a ImageEntry>,
        sink: &dyn DownloadSink,
    ) -> Result<usize> {
        let mut exported = 0;
        for entry in entries.into_iter().filter(|e| e.artifact().is_some()) {
            if exported > 0 && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            if self.export_one(entry, sink)? {
                exported += 1;
            }
        }
        tracing::info!(exported, "export complete");
        Ok(exported)
    }
}
