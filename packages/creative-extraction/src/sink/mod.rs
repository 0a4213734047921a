//! Batched persistence to the document store and search index.
//!
//! Processed creatives accumulate in three batches (image search docs, video
//! search docs, store documents). `flush` swaps each batch out under the
//! lock and writes it with a deadline. Document-store writes are retried with
//! backoff inside that deadline. Failures that outlast it are logged and the
//! batch is dropped; they never propagate to the run.

pub mod normalize;

use std::collections::HashSet;
use std::future::Future;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SinkError, SinkResult};
use crate::providers::backoff::RetryStep;
use crate::traits::search::SearchIndex;
use crate::traits::store::DocumentStore;
use crate::types::config::SinkConfig;
use crate::types::creative::MediaType;
use crate::types::document::{BulkReport, CreativeDocument, ProcessedCreative};

pub use normalize::{normalize_date, search_document};

#[derive(Default)]
struct Batches {
    image: Vec<ProcessedCreative>,
    video: Vec<ProcessedCreative>,
    documents: Vec<CreativeDocument>,
}

/// Sizes of the pending batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub image: usize,
    pub video: usize,
    pub documents: usize,
}

impl PendingCounts {
    pub fn is_empty(&self) -> bool {
        self.image == 0 && self.video == 0 && self.documents == 0
    }
}

/// What happened to one batch during a flush.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkOutcome {
    /// Nothing to write, or no destination configured
    Skipped,
    Written(BulkReport),
    Failed(String),
}

/// Per-batch result of a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub documents: SinkOutcome,
    pub image: SinkOutcome,
    pub video: SinkOutcome,
}

/// Accumulates processed creatives and writes them in bulk.
pub struct BatchSink {
    documents: Arc<dyn DocumentStore>,
    search: Option<Arc<dyn SearchIndex>>,
    config: SinkConfig,
    batches: Mutex<Batches>,
    ensured: Mutex<HashSet<MediaType>>,
}

impl BatchSink {
    /// `search` is optional; without it only the document store is written.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        search: Option<Arc<dyn SearchIndex>>,
        config: SinkConfig,
    ) -> Self {
        Self {
            documents,
            search,
            config,
            batches: Mutex::new(Batches::default()),
            ensured: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    fn index_for(&self, media_type: MediaType) -> &str {
        match media_type {
            MediaType::Image => &self.config.image_index,
            MediaType::Video => &self.config.video_index,
        }
    }

    /// Queue one processed creative. Returns `true` when a batch reached
    /// capacity and the caller should flush.
    pub async fn push(&self, item: ProcessedCreative) -> bool {
        let document = item.to_document();
        let mut batches = self.batches.lock().await;

        batches.documents.push(document);
        if self.search.is_some() {
            match item.media_type() {
                MediaType::Image => batches.image.push(item),
                MediaType::Video => batches.video.push(item),
            }
        }

        let capacity = self.config.capacity;
        batches.documents.len() >= capacity
            || batches.image.len() >= capacity
            || batches.video.len() >= capacity
    }

    pub async fn pending(&self) -> PendingCounts {
        let batches = self.batches.lock().await;
        PendingCounts {
            image: batches.image.len(),
            video: batches.video.len(),
            documents: batches.documents.len(),
        }
    }

    /// Write and clear every pending batch. Empty batches cause no writes.
    pub async fn flush(&self) -> FlushReport {
        let Batches {
            image,
            video,
            documents,
        } = {
            let mut batches = self.batches.lock().await;
            mem::take(&mut *batches)
        };

        debug!(
            image = image.len(),
            video = video.len(),
            documents = documents.len(),
            "flushing batches"
        );

        let documents = self.flush_documents(documents).await;
        let image = self.flush_search(MediaType::Image, image).await;
        let video = self.flush_search(MediaType::Video, video).await;

        FlushReport {
            documents,
            image,
            video,
        }
    }

    async fn flush_documents(&self, documents: Vec<CreativeDocument>) -> SinkOutcome {
        if documents.is_empty() {
            return SinkOutcome::Skipped;
        }

        let store = self.documents.clone();
        let backoff = self.config.store_retry.clone();
        let result = self
            .with_deadline("document-store", async move {
                let mut retry = backoff.start();
                loop {
                    let error = match store.upsert_documents(&documents).await {
                        Ok(report) => return Ok(report),
                        Err(e) => e,
                    };
                    match retry.on_failure(&backoff) {
                        RetryStep::Retry { delay, .. } => {
                            warn!(
                                attempt = retry.attempt(),
                                max_attempts = retry.max_attempts(),
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "document write failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryStep::Exhausted => return Err(SinkError::from(error)),
                    }
                }
            })
            .await;

        log_outcome("document-store", result)
    }

    async fn flush_search(&self, media_type: MediaType, items: Vec<ProcessedCreative>) -> SinkOutcome {
        let Some(search) = self.search.clone() else {
            return SinkOutcome::Skipped;
        };
        if items.is_empty() {
            return SinkOutcome::Skipped;
        }

        let index = self.index_for(media_type).to_string();
        if let Err(e) = self.ensure_index_once(search.as_ref(), &index, media_type).await {
            warn!(index = %index, error = %e, dropped = items.len(), "search index unavailable");
            return SinkOutcome::Failed(e.to_string());
        }

        let docs: Vec<_> = items.iter().map(search_document).collect();
        let target = index.clone();
        let result = self
            .with_deadline(&target, async move { search.bulk_index(&index, &docs).await })
            .await;

        log_outcome(&target, result)
    }

    async fn ensure_index_once(
        &self,
        search: &dyn SearchIndex,
        index: &str,
        media_type: MediaType,
    ) -> SinkResult<()> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(&media_type) {
            return Ok(());
        }
        search.ensure_index(index, media_type).await?;
        ensured.insert(media_type);
        Ok(())
    }

    async fn with_deadline<F>(&self, target: &str, write: F) -> SinkResult<BulkReport>
    where
        F: Future<Output = SinkResult<BulkReport>>,
    {
        let timeout: Duration = self.config.bulk_timeout;
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| SinkError::Timeout {
                target: target.to_string(),
                timeout,
            })?
    }

    /// Remove everything stored for `page_id` from the document store and
    /// both search indexes. Failures are logged.
    pub async fn delete_for_page(&self, page_id: &str) {
        match self.documents.delete_for_page(page_id).await {
            Ok(removed) => info!(page_id = %page_id, removed, "cleared stored documents"),
            Err(e) => warn!(page_id = %page_id, error = %e, "failed to clear stored documents"),
        }

        let Some(search) = &self.search else {
            return;
        };
        for index in [&self.config.image_index, &self.config.video_index] {
            match search.delete_for_page(index, page_id).await {
                Ok(removed) => info!(page_id = %page_id, index = %index, removed, "cleared search documents"),
                Err(e) => warn!(page_id = %page_id, index = %index, error = %e, "failed to clear search documents"),
            }
        }
    }
}

fn log_outcome(target: &str, result: SinkResult<BulkReport>) -> SinkOutcome {
    match result {
        Ok(report) => {
            for failure in &report.failures {
                warn!(target_name = %target, id = %failure.id, reason = %failure.reason, "write failed for item");
            }
            info!(
                target_name = %target,
                succeeded = report.succeeded,
                failed = report.failures.len(),
                "batch written"
            );
            SinkOutcome::Written(report)
        }
        Err(e) => {
            warn!(target_name = %target, error = %e, "batch write failed, batch dropped");
            SinkOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MemorySearchIndex;
    use crate::stores::MemoryStore;
    use crate::testing::{processed_creative, FlakyDocumentStore, SlowDocumentStore};

    fn sink_with_search(capacity: usize) -> (BatchSink, Arc<MemoryStore>, Arc<MemorySearchIndex>) {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(MemorySearchIndex::new());
        let sink = BatchSink::new(
            store.clone(),
            Some(search.clone()),
            SinkConfig::default().with_capacity(capacity),
        );
        (sink, store, search)
    }

    #[tokio::test]
    async fn test_empty_flush_makes_no_calls() {
        let (sink, store, search) = sink_with_search(10);
        let report = sink.flush().await;

        assert_eq!(report.documents, SinkOutcome::Skipped);
        assert_eq!(report.image, SinkOutcome::Skipped);
        assert_eq!(report.video, SinkOutcome::Skipped);
        assert_eq!(search.bulk_calls(), 0);
        assert_eq!(search.ensure_calls(), 0);
        assert_eq!(store.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_flush_clears_batches() {
        let (sink, store, search) = sink_with_search(10);
        sink.push(processed_creative("ad-1", "https://cdn.example.com/1.jpg", MediaType::Image)).await;
        sink.push(processed_creative("ad-1", "https://cdn.example.com/2.mp4", MediaType::Video)).await;

        assert_eq!(
            sink.pending().await,
            PendingCounts {
                image: 1,
                video: 1,
                documents: 2
            }
        );

        let report = sink.flush().await;
        assert!(matches!(report.image, SinkOutcome::Written(_)));
        assert!(sink.pending().await.is_empty());
        assert_eq!(store.document_count().await, 2);
        assert_eq!(search.document_count("image_competitors_analysis").await, 1);
        assert_eq!(search.document_count("video_competitors_analysis").await, 1);

        // A second flush has nothing to write
        sink.flush().await;
        assert_eq!(search.bulk_calls(), 2);
    }

    #[tokio::test]
    async fn test_push_reports_full_batch() {
        let (sink, _, _) = sink_with_search(2);
        assert!(!sink.push(processed_creative("a", "https://x/1.jpg", MediaType::Image)).await);
        assert!(sink.push(processed_creative("a", "https://x/2.jpg", MediaType::Image)).await);
    }

    #[tokio::test]
    async fn test_index_ensured_once_per_media_type() {
        let (sink, _, search) = sink_with_search(10);
        for i in 0..3 {
            sink.push(processed_creative("a", &format!("https://x/{i}.jpg"), MediaType::Image)).await;
            sink.flush().await;
        }
        assert_eq!(search.ensure_calls(), 1);
        assert_eq!(search.bulk_calls(), 3);
    }

    #[tokio::test]
    async fn test_without_search_only_documents_are_batched() {
        let store = Arc::new(MemoryStore::new());
        let sink = BatchSink::new(store.clone(), None, SinkConfig::default());
        sink.push(processed_creative("a", "https://x/1.jpg", MediaType::Image)).await;

        let pending = sink.pending().await;
        assert_eq!(pending.image, 0);
        assert_eq!(pending.documents, 1);

        let report = sink.flush().await;
        assert_eq!(report.image, SinkOutcome::Skipped);
        assert_eq!(store.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_contained() {
        let (sink, _, search) = sink_with_search(10);
        search.fail_bulk_writes(true);
        sink.push(processed_creative("a", "https://x/1.jpg", MediaType::Image)).await;

        let report = sink.flush().await;
        assert!(matches!(report.image, SinkOutcome::Failed(_)));
        assert!(matches!(report.documents, SinkOutcome::Written(_)));
        assert!(sink.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_bulk_failure_is_reported() {
        let (sink, _, search) = sink_with_search(10);
        let rejected = processed_creative("a", "https://x/bad.jpg", MediaType::Image);
        search.reject_ids([rejected.creative.document_id()]).await;
        sink.push(rejected).await;
        sink.push(processed_creative("a", "https://x/good.jpg", MediaType::Image)).await;

        match sink.flush().await.image {
            SinkOutcome::Written(report) => {
                assert_eq!(report.succeeded, 1);
                assert_eq!(report.failures.len(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let sink = BatchSink::new(
            Arc::new(SlowDocumentStore::new(Duration::from_secs(60))),
            None,
            SinkConfig::default().with_bulk_timeout(Duration::from_secs(5)),
        );
        sink.push(processed_creative("a", "https://x/1.jpg", MediaType::Image)).await;

        let report = sink.flush().await;
        assert!(matches!(report.documents, SinkOutcome::Failed(ref msg) if msg.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_write_retried_until_success() {
        let store = Arc::new(FlakyDocumentStore::new(4));
        let sink = BatchSink::new(store.clone(), None, SinkConfig::default());
        sink.push(processed_creative("a", "https://x/1.jpg", MediaType::Image)).await;

        let report = sink.flush().await;
        assert_eq!(report.documents, SinkOutcome::Written(BulkReport::all_succeeded(1)));
        assert_eq!(store.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_write_gives_up_after_max_attempts() {
        let store = Arc::new(FlakyDocumentStore::new(5));
        let sink = BatchSink::new(store.clone(), None, SinkConfig::default());
        sink.push(processed_creative("a", "https://x/1.jpg", MediaType::Image)).await;

        let report = sink.flush().await;
        assert!(matches!(report.documents, SinkOutcome::Failed(_)));
        assert_eq!(store.calls(), 5);
    }
}
