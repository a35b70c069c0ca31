//! One resize tool session: registry, settings, processor and exporter wired
//! together the way the page uses them.

use crate::batch::{BatchOutput, BatchProcessor, PendingBatch};
use crate::config::{OutputFormat, ResizeConfig};
use crate::error::BatchError;
use crate::export::{DownloadSink, Exporter};
use crate::object_url::ObjectUrlTable;
use crate::registry::{EntryId, FileInput, ImageEntry, Registry};
use crate::transcode::Transcoder;
use crate::Result;
use multitool_telemetry::{metrics, names};

/// Single-file or bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One image at a time; adding a file replaces the current one
    Single,
    /// Any number of images
    #[default]
    Bulk,
}

/// State behind the resize tool.
#[derive(Debug)]
pub struct ResizeSession {
    urls: ObjectUrlTable,
    registry: Registry,
    config: ResizeConfig,
    processor: BatchProcessor,
    exporter: Exporter,
    mode: Mode,
}

impl ResizeSession {
    /// Start an empty session.
    pub fn new(config: ResizeConfig, exporter: Exporter) -> Self {
        let urls = ObjectUrlTable::new();
        Self {
            registry: Registry::new(urls.clone()),
            processor: BatchProcessor::new(Transcoder::new(urls.clone())),
            urls,
            config,
            exporter,
            mode: Mode::default(),
        }
    }

    /// URL table shared by previews and artifacts.
    pub fn urls(&self) -> &ObjectUrlTable {
        &self.urls
    }

    /// Registered entries.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current settings.
    pub fn config(&self) -> &ResizeConfig {
        &self.config
    }

    /// Download naming and pacing.
    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch modes. Switching clears the registry; settings are kept.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            tracing::debug!(?mode, "switching mode");
            self.mode = mode;
            self.registry.clear();
        }
    }

    /// Accept one file from the user.
    ///
    /// Non-image MIME types are rejected before decoding. The first image
    /// into an empty registry seeds unset target dimensions. In single mode
    /// the current entry is replaced only once the new file has decoded.
    pub fn add_file(&mut self, file: FileInput) -> Option<EntryId> {
        if !file.is_image() {
            tracing::warn!(name = %file.name, mime = %file.mime_type, "rejected non-image file");
            metrics().increment(names::IMAGES_DROPPED);
            return None;
        }

        let first = self.mode == Mode::Single || self.registry.is_empty();
        let id = match self.mode {
            Mode::Single => self.registry.replace(file)?,
            Mode::Bulk => self.registry.register(file)?,
        };

        if first {
            if let Some(reference) = self.registry.reference() {
                if self.config.seed(reference) {
                    tracing::debug!(size = %reference, "seeded target size");
                }
            }
        }
        Some(id)
    }

    /// Accept several files; returns the ids of those that were registered.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = FileInput>) -> Vec<EntryId> {
        files.into_iter().filter_map(|file| self.add_file(file)).collect()
    }

    /// Remove one entry; false if `id` is unknown.
    pub fn remove(&mut self, id: EntryId) -> bool {
        self.registry.remove(id)
    }

    /// Remove every entry. Settings are kept.
    pub fn clear(&mut self) {
        self.registry.clear();
    }

    /// See [`ResizeConfig::set_width`].
    pub fn set_width(&mut self, width: u32) -> bool {
        self.config.set_width(width, self.registry.reference())
    }

    /// See [`ResizeConfig::set_height`].
    pub fn set_height(&mut self, height: u32) -> bool {
        self.config.set_height(height, self.registry.reference())
    }

    /// Set both dimensions exactly, regardless of the aspect lock.
    pub fn set_size(&mut self, width: u32, height: u32) -> bool {
        let locked = self.config.aspect_locked();
        self.config.set_aspect_locked(false);
        let applied = self.config.set_width(width, None) && self.config.set_height(height, None);
        self.config.set_aspect_locked(locked);
        applied
    }

    /// Turn the aspect lock on or off.
    pub fn set_aspect_locked(&mut self, locked: bool) {
        self.config.set_aspect_locked(locked);
    }

    /// Choose the output encoding.
    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.config.set_output_format(format);
    }

    /// Set encoder quality (clamped).
    pub fn set_quality(&mut self, quality: u32) {
        self.config.set_quality(quality);
    }

    /// Claim the processor for the current entries and settings.
    ///
    /// The returned batch owns copies of both, so the session stays usable
    /// while it runs; hand the output to [`ResizeSession::commit`].
    pub fn begin_batch(&self) -> std::result::Result<PendingBatch, BatchError> {
        self.processor.start(self.registry.snapshot(), self.config.clone())
    }

    /// Store a finished batch on the entries that still exist.
    pub fn commit(&mut self, output: BatchOutput) {
        self.registry.commit(output);
    }

    /// Process every entry and store the results. Returns the entry count.
    pub async fn process_all(&mut self) -> std::result::Result<usize, BatchError> {
        let output = self.begin_batch()?.run().await?;
        let processed = output.len();
        self.commit(output);
        Ok(processed)
    }

    /// Download one processed entry. Returns false if it has no artifact.
    pub fn export_one(&self, id: EntryId, sink: &dyn DownloadSink) -> Result<bool> {
        match self.registry.get(id) {
            Some(entry) => self.exporter.export_one(entry, sink),
            None => Ok(false),
        }
    }

    /// Download every processed entry in registry order.
    pub async fn export_all(&self, sink: &dyn DownloadSink) -> Result<usize> {
        self.exporter.export_all(self.registry.iter(), sink).await
    }

    /// Entries in registry order.
    pub fn entries(&self) -> impl Iterator<Item = &ImageEntry> {
        self.registry.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MemorySink;
    use crate::registry::Dimensions;
    use crate::test_support::{corrupt_png_file, png_file, text_file};

    fn session() -> ResizeSession {
        ResizeSession::new(ResizeConfig::default(), Exporter::new("_resized", std::time::Duration::ZERO))
    }

    #[test]
    fn test_first_image_seeds_targets() {
        let mut session = session();
        session.add_file(png_file("a.png", 800, 600)).unwrap();
        session.add_file(png_file("b.png", 10, 10)).unwrap();
        assert_eq!(session.config().target(), Some(Dimensions::new(800, 600)));
    }

    #[test]
    fn test_aspect_lock_against_first_image() {
        let mut session = session();
        session.add_file(png_file("a.png", 800, 600)).unwrap();
        session.add_file(png_file("b.png", 50, 500)).unwrap();

        assert!(session.set_width(400));
        assert_eq!(session.config().target_height(), 300);
        assert!(session.set_height(150));
        assert_eq!(session.config().target_width(), 200);
    }

    #[test]
    fn test_clear_resets_reference_but_not_settings() {
        let mut session = session();
        session.add_file(png_file("a.png", 800, 600)).unwrap();
        session.set_width(400);
        session.set_quality(55);

        session.clear();
        session.add_file(png_file("b.png", 300, 100)).unwrap();

        // targets were set, so they are not reseeded
        assert_eq!(session.config().target(), Some(Dimensions::new(400, 300)));
        assert_eq!(session.config().quality(), 55);

        session.set_width(150);
        assert_eq!(session.config().target_height(), 50);
    }

    #[test]
    fn test_non_image_mime_rejected() {
        let mut session = session();
        assert!(session.add_file(text_file("notes.txt")).is_none());

        // image MIME but undecodable content is dropped silently too
        let fake = FileInput::new("fake.png", "image/png", b"not really".to_vec());
        assert!(session.add_file(fake).is_none());
        assert!(session.registry().is_empty());
        assert_eq!(session.urls().outstanding(), 0);
    }

    #[test]
    fn test_single_mode_replaces_entry() {
        let mut session = session();
        session.set_mode(Mode::Single);
        session.add_file(png_file("a.png", 8, 8)).unwrap();
        let b = session.add_file(png_file("b.png", 8, 8)).unwrap();

        let ids: Vec<_> = session.entries().map(ImageEntry::id).collect();
        assert_eq!(ids, [b]);
        assert_eq!(session.urls().outstanding(), 1);
    }

    #[test]
    fn test_single_mode_keeps_entry_on_undecodable_file() {
        let mut session = session();
        session.set_mode(Mode::Single);
        let a = session.add_file(png_file("a.png", 8, 8)).unwrap();

        let bad = FileInput::new("bad.png", "image/png", b"garbage".to_vec());
        assert!(session.add_file(bad).is_none());
        assert!(session.add_file(text_file("notes.txt")).is_none());

        let ids: Vec<_> = session.entries().map(ImageEntry::id).collect();
        assert_eq!(ids, [a]);
        assert_eq!(session.urls().outstanding(), 1);
    }

    #[test]
    fn test_mode_switch_clears_registry() {
        let mut session = session();
        session.add_files([png_file("a.png", 8, 8), png_file("b.png", 8, 8)]);
        session.set_quality(20);

        session.set_mode(Mode::Single);
        assert!(session.registry().is_empty());
        assert_eq!(session.config().quality(), 20);
        assert_eq!(session.urls().outstanding(), 0);
    }

    #[test]
    fn test_set_size_ignores_lock() {
        let mut session = session();
        session.add_file(png_file("a.png", 800, 600)).unwrap();
        assert!(session.set_size(100, 100));
        assert_eq!(session.config().target(), Some(Dimensions::new(100, 100)));
        assert!(session.config().aspect_locked());
    }

    #[tokio::test]
    async fn test_process_and_export_round() {
        let mut session = session();
        session.add_files([
            png_file("one.png", 64, 48),
            png_file("two.png", 32, 32),
            png_file("three.png", 16, 64),
        ]);
        session.set_width(32);
        session.set_output_format(OutputFormat::Png);

        assert_eq!(session.process_all().await.unwrap(), 3);
        for entry in session.entries() {
            assert_eq!(entry.artifact().unwrap().dimensions(), Dimensions::new(32, 24));
        }

        let sink = MemorySink::new();
        assert_eq!(session.export_all(&sink).await.unwrap(), 3);
        assert_eq!(
            sink.filenames(),
            ["one_resized.png", "two_resized.png", "three_resized.png"]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_commits_nothing() {
        let mut session = session();
        session.add_files([
            png_file("ok-1.png", 32, 32),
            corrupt_png_file("broken.png", 32, 32),
            png_file("ok-2.png", 32, 32),
        ]);
        assert_eq!(session.registry().len(), 3);

        let err = session.process_all().await.unwrap_err();
        assert!(matches!(err, BatchError::Failed { .. }));
        assert!(session.entries().all(|e| e.artifact().is_none()));
        assert_eq!(session.urls().outstanding(), 3);
    }

    #[tokio::test]
    async fn test_reprocessing_replaces_artifacts() {
        let mut session = session();
        session.add_file(png_file("a.png", 20, 20)).unwrap();
        session.set_output_format(OutputFormat::Png);

        session.process_all().await.unwrap();
        assert_eq!(session.urls().outstanding(), 2);

        session.set_width(10);
        session.process_all().await.unwrap();
        assert_eq!(session.urls().outstanding(), 2);
        let entry = session.entries().next().unwrap();
        assert_eq!(entry.artifact().unwrap().dimensions(), Dimensions::new(10, 10));
    }

    #[tokio::test]
    async fn test_remove_during_batch() {
        let mut session = session();
        let a = session.add_file(png_file("a.png", 20, 20)).unwrap();
        session.add_file(png_file("b.png", 20, 20)).unwrap();
        session.set_output_format(OutputFormat::Png);

        let pending = session.begin_batch().unwrap();
        assert!(matches!(session.begin_batch(), Err(BatchError::AlreadyProcessing)));
        assert!(session.remove(a));

        let output = pending.run().await.unwrap();
        session.commit(output);

        assert_eq!(session.registry().len(), 1);
        // one preview plus one artifact; the removed entry's artifact was released
        assert_eq!(session.urls().outstanding(), 2);
    }

    #[tokio::test]
    async fn test_export_one_unknown_id() {
        let session = session();
        let sink = MemorySink::new();
        let id = crate::registry::EntryId::new();
        assert!(!session.export_one(id, &sink).unwrap());
    }
}
