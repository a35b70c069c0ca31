//! Concurrent processing of every registered entry.
//!
//! A batch is all-or-nothing: if any entry fails, the caller gets a single
//! [`BatchError::Failed`] and nothing is committed back to the registry.
//! Only one batch may be in flight per processor.

use crate::config::ResizeConfig;
use crate::error::{BatchError, TranscodeError};
use crate::registry::{EntryId, TranscodeJob};
use crate::transcode::{Artifact, Transcoder};
use futures::future::join_all;
use multitool_telemetry::{metrics, names, Timer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Successful batch output, in registry order.
pub type BatchOutput = Vec<(EntryId, Artifact)>;

/// Runs the transcoder over a batch of entries.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    transcoder: Transcoder,
    in_flight: Arc<AtomicBool>,
}

impl BatchProcessor {
    /// Create a processor around a transcoder.
    pub fn new(transcoder: Transcoder) -> Self {
        Self {
            transcoder,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a batch has started and not yet settled.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the processor for a batch.
    ///
    /// Fails with [`BatchError::AlreadyProcessing`] while another batch from
    /// this processor is pending. The claim is released when the returned
    /// batch finishes running or is dropped.
    pub fn start(
        &self,
        jobs: Vec<TranscodeJob>,
        config: ResizeConfig,
    ) -> Result<PendingBatch, BatchError> {
        if config.target().is_none() {
            return Err(BatchError::MissingTarget);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("batch requested while another is still processing");
            return Err(BatchError::AlreadyProcessing);
        }

        Ok(PendingBatch {
            claim: InFlight(Arc::clone(&self.in_flight)),
            transcoder: self.transcoder.clone(),
            jobs,
            config,
        })
    }

    /// Start and run a batch.
    pub async fn process_all(
        &self,
        jobs: Vec<TranscodeJob>,
        config: ResizeConfig,
    ) -> Result<BatchOutput, BatchError> {
        self.start(jobs, config)?.run().await
    }
}

/// Clears the in-flight flag on every exit path.
#[derive(Debug)]
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A claimed batch with its own copy of the entries and configuration.
#[derive(Debug)]
pub struct PendingBatch {
    claim: InFlight,
    transcoder: Transcoder,
    jobs: Vec<TranscodeJob>,
    config: ResizeConfig,
}

impl PendingBatch {
    /// Number of entries in the batch.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the batch has no entries.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Transcode every entry concurrently and wait for all of them.
    pub async fn run(self) -> Result<BatchOutput, BatchError> {
        let PendingBatch {
            claim,
            transcoder,
            jobs,
            config,
        } = self;
        let total = jobs.len();
        let timer = Timer::start(names::BATCH_DURATION);

        tracing::info!(
            total,
            size = ?config.target(),
            format = %config.output_format(),
            "processing batch"
        );

        let settled = join_all(jobs.into_iter().map(|job| {
            let id = job.id;
            let transcoder = transcoder.clone();
            let config = config.clone();
            async move { (id, transcoder.transcode(job, config).await) }
        }))
        .await;

        let elapsed = timer.stop();
        drop(claim);

        let mut output = Vec::with_capacity(total);
        let mut failures: Vec<TranscodeError> = Vec::new();
        for (id, result) in settled {
            match result {
                Ok(artifact) => output.push((id, artifact)),
                Err(e) => failures.push(e),
            }
        }

        if failures.is_empty() {
            metrics().increment(names::BATCH_SUCCEEDED);
            tracing::info!(total, elapsed_ms = elapsed.as_millis() as u64, "batch complete");
            Ok(output)
        } else {
            metrics().increment(names::BATCH_FAILED);
            for failure in &failures {
                tracing::warn!(id = %failure.id, name = %failure.name, error = %failure.source, "entry failed");
            }
            tracing::warn!(failed = failures.len(), total, "batch failed");
            Err(BatchError::Failed { failures, total })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::object_url::ObjectUrlTable;
    use crate::registry::{Dimensions, Registry};
    use crate::test_support::{corrupt_png_file, png_file};

    fn setup() -> (ObjectUrlTable, Registry, BatchProcessor) {
        let urls = ObjectUrlTable::new();
        let registry = Registry::new(urls.clone());
        let processor = BatchProcessor::new(Transcoder::new(urls.clone()));
        (urls, registry, processor)
    }

    fn config() -> ResizeConfig {
        let mut config = ResizeConfig::default();
        config.seed(Dimensions::new(24, 16));
        config.set_output_format(OutputFormat::Png);
        config
    }

    #[tokio::test]
    async fn test_all_entries_get_artifacts() {
        let (_, mut registry, processor) = setup();
        for n in 1..=3 {
            registry.register(png_file(&format!("{n}.png"), 30 * n, 20)).unwrap();
        }

        let output = processor.process_all(registry.snapshot(), config()).await.unwrap();
        assert_eq!(output.len(), 3);

        let order: Vec<_> = output.iter().map(|(id, _)| *id).collect();
        let expected: Vec<_> = registry.iter().map(|e| e.id()).collect();
        assert_eq!(order, expected);

        registry.commit(output);
        for entry in registry.iter() {
            let artifact = entry.artifact().unwrap();
            assert!(!artifact.is_empty());
            assert_eq!(artifact.dimensions(), Dimensions::new(24, 16));
        }
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_one_corrupt_entry_fails_the_batch() {
        let (urls, mut registry, processor) = setup();
        registry.register(png_file("good-1.png", 32, 32)).unwrap();
        let bad = registry.register(corrupt_png_file("bad.png", 32, 32)).unwrap();
        registry.register(png_file("good-2.png", 32, 32)).unwrap();

        let err = processor.process_all(registry.snapshot(), config()).await.unwrap_err();

        match err {
            BatchError::Failed { failures, total } => {
                assert_eq!(total, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].id, bad);
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing committed, artifacts from the good entries released
        assert!(registry.iter().all(|e| e.artifact().is_none()));
        assert_eq!(urls.outstanding(), 3);
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_second_batch_rejected_while_pending() {
        let (_, mut registry, processor) = setup();
        registry.register(png_file("a.png", 16, 16)).unwrap();

        let pending = processor.start(registry.snapshot(), config()).unwrap();
        assert!(processor.is_processing());

        let second = processor.start(registry.snapshot(), config());
        assert!(matches!(second, Err(BatchError::AlreadyProcessing)));

        let output = pending.run().await.unwrap();
        assert_eq!(output.len(), 1);
        assert!(!processor.is_processing());

        // free again once the first batch settled
        assert!(processor.start(registry.snapshot(), config()).is_ok());
    }

    #[tokio::test]
    async fn test_dropped_batch_releases_claim() {
        let (_, mut registry, processor) = setup();
        registry.register(png_file("a.png", 16, 16)).unwrap();

        let pending = processor.start(registry.snapshot(), config()).unwrap();
        drop(pending);
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_batch_survives_registry_clear() {
        let (urls, mut registry, processor) = setup();
        registry.register(png_file("a.png", 16, 16)).unwrap();
        registry.register(png_file("b.png", 16, 16)).unwrap();

        let pending = processor.start(registry.snapshot(), config()).unwrap();
        registry.clear();

        let output = pending.run().await.unwrap();
        assert_eq!(output.len(), 2);

        registry.commit(output);
        assert!(registry.is_empty());
        assert_eq!(urls.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_config_edits_after_start_do_not_apply() {
        let (_, mut registry, processor) = setup();
        registry.register(png_file("a.png", 40, 40)).unwrap();

        let mut live = config();
        let pending = processor.start(registry.snapshot(), live.clone()).unwrap();
        live.set_aspect_locked(false);
        live.set_width(5, None);

        let output = pending.run().await.unwrap();
        assert_eq!(output[0].1.dimensions(), Dimensions::new(24, 16));
    }

    #[tokio::test]
    async fn test_unset_target_rejected() {
        let (_, mut registry, processor) = setup();
        registry.register(png_file("a.png", 16, 16)).unwrap();

        let result = processor.start(registry.snapshot(), ResizeConfig::default());
        assert!(matches!(result, Err(BatchError::MissingTarget)));
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let (_, _, processor) = setup();
        let output = processor.process_all(Vec::new(), config()).await.unwrap();
        assert!(output.is_empty());
    }
}
