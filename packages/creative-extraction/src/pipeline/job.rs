//! Page runs.
//!
//! A run deletes prior results for the page, processes ads in order with the
//! creatives of each ad running concurrently, flushes the sink every
//! `flush_every_ads` ads, and always finishes with a final flush and the
//! release of every registered resource.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{JobError, PipelineError};
use crate::pipeline::creative::CreativePipeline;
use crate::pipeline::progress::ProgressTracker;
use crate::providers::ExtractionRouter;
use crate::sink::BatchSink;
use crate::traits::hasher::ContentHasher;
use crate::traits::resource::RunResource;
use crate::traits::search::SearchIndex;
use crate::traits::store::{DedupStore, DocumentStore, JobStatusStore};
use crate::types::ad::AdRecord;
use crate::types::brand::BrandProfile;
use crate::types::config::{JobConfig, SinkConfig};
use crate::types::job::{ItemOutcome, JobStatus, JobSummary, ProcessedAd};

/// Everything one run needs, constructed per page.
pub struct RunContext {
    pub page_id: String,
    pub brand: BrandProfile,
    pub hasher: Arc<dyn ContentHasher>,
    pub dedup: Arc<dyn DedupStore>,
    pub extractors: ExtractionRouter,
    pub documents: Arc<dyn DocumentStore>,
    pub search: Option<Arc<dyn SearchIndex>>,
    pub status: Arc<dyn JobStatusStore>,
    pub resources: Vec<Arc<dyn RunResource>>,
    pub sink_config: SinkConfig,
    pub job_config: JobConfig,
}

impl RunContext {
    pub fn new(
        page_id: impl Into<String>,
        hasher: Arc<dyn ContentHasher>,
        dedup: Arc<dyn DedupStore>,
        extractors: ExtractionRouter,
        documents: Arc<dyn DocumentStore>,
        status: Arc<dyn JobStatusStore>,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            brand: BrandProfile::from_url(None),
            hasher,
            dedup,
            extractors,
            documents,
            search: None,
            status,
            resources: Vec::new(),
            sink_config: SinkConfig::default(),
            job_config: JobConfig::default(),
        }
    }

    pub fn with_brand(mut self, brand: BrandProfile) -> Self {
        self.brand = brand;
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(search);
        self
    }

    /// Register a resource released when the run ends.
    pub fn with_resource(mut self, resource: Arc<dyn RunResource>) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_sink_config(mut self, config: SinkConfig) -> Self {
        self.sink_config = config;
        self
    }

    pub fn with_job_config(mut self, config: JobConfig) -> Self {
        self.job_config = config;
        self
    }
}

/// Releases run resources exactly once.
///
/// `close` is the normal path. If the session is dropped without it (the run
/// future was cancelled) release is spawned onto the current runtime.
struct RunSession {
    resources: Vec<Arc<dyn RunResource>>,
}

impl RunSession {
    fn open(resources: Vec<Arc<dyn RunResource>>) -> Self {
        Self { resources }
    }

    async fn close(mut self) {
        release_all(std::mem::take(&mut self.resources)).await;
    }
}

impl Drop for RunSession {
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        let resources = std::mem::take(&mut self.resources);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_all(resources));
            }
            Err(_) => warn!(count = resources.len(), "run resources dropped without release"),
        }
    }
}

async fn release_all(resources: Vec<Arc<dyn RunResource>>) {
    for resource in resources {
        resource.release().await;
        info!(resource = resource.name(), "released run resource");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs every creative of one page.
pub struct JobRunner {
    page_id: String,
    pipeline: Arc<CreativePipeline>,
    sink: Arc<BatchSink>,
    progress: Arc<ProgressTracker>,
    resources: Vec<Arc<dyn RunResource>>,
    config: JobConfig,
}

impl JobRunner {
    pub fn new(ctx: RunContext) -> Self {
        let sink = Arc::new(BatchSink::new(ctx.documents, ctx.search, ctx.sink_config));
        let progress = Arc::new(ProgressTracker::new(ctx.page_id.clone(), ctx.status));
        let pipeline = Arc::new(CreativePipeline::new(
            ctx.hasher,
            ctx.dedup,
            ctx.extractors,
            sink.clone(),
            progress.clone(),
            Arc::new(ctx.brand),
        ));

        Self {
            page_id: ctx.page_id,
            pipeline,
            sink,
            progress,
            resources: ctx.resources,
            config: ctx.job_config,
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn pipeline(&self) -> &Arc<CreativePipeline> {
        &self.pipeline
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Process `ads` for this page. Consumes the runner; resources are
    /// released before this returns, whatever the outcome.
    pub async fn run(mut self, ads: Vec<AdRecord>) -> Result<JobSummary, JobError> {
        let session = RunSession::open(std::mem::take(&mut self.resources));
        info!(page_id = %self.page_id, ads = ads.len(), "starting page run");

        let outcome = AssertUnwindSafe(self.drive(&ads)).catch_unwind().await;

        // Empty unless the run was interrupted before its own final flush
        self.sink.flush().await;

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(page_id = %self.page_id, panic = %message, "page run panicked");
                self.progress.aborted(JobStatus::Error, &message).await;
                Err(JobError::Panicked(message))
            }
        };

        session.close().await;
        result
    }

    async fn drive(&self, ads: &[AdRecord]) -> Result<JobSummary, JobError> {
        let total = ads.len();
        self.progress.started(total).await;
        self.sink.delete_for_page(&self.page_id).await;

        if ads.is_empty() {
            warn!(page_id = %self.page_id, "no ads to process");
            self.progress
                .aborted(JobStatus::Failed, "no ads found for page")
                .await;
            return Err(JobError::NoAds {
                page_id: self.page_id.clone(),
            });
        }

        let mut summary = JobSummary::new(self.page_id.clone(), total);
        for (index, ad) in ads.iter().enumerate() {
            let position = index + 1;
            self.progress.processing_ad(position, ad.ad_id()).await;

            match self.process_ad(ad).await {
                Ok(processed) => {
                    info!(
                        page_id = %self.page_id,
                        ad_id = %processed.ad_id,
                        position,
                        total,
                        items = processed.total_items,
                        processed = processed.processed_items,
                        "ad processed"
                    );
                    summary.record_ad(&processed);
                }
                Err(e) => {
                    warn!(page_id = %self.page_id, position, error = %e, "ad failed");
                    summary.record_ad_failure();
                }
            }

            if position % self.config.flush_every_ads() == 0 || position == total {
                self.sink.flush().await;
            }
        }

        info!(
            page_id = %self.page_id,
            successful_ads = summary.successful_ads,
            failed_ads = summary.failed_ads,
            completed = summary.completed_items,
            reused = summary.reused_items,
            failed = summary.failed_items,
            errored = summary.errored_items,
            "page run complete"
        );
        self.progress.finished(summary.completion()).await;
        Ok(summary)
    }

    /// Process every creative of one ad concurrently. A task that panics is
    /// recorded as an errored creative; the rest of the ad is unaffected.
    pub async fn process_ad(&self, ad: &AdRecord) -> Result<ProcessedAd, PipelineError> {
        let creatives = ad.creatives(&self.page_id)?;
        let ad_id = ad.ad_id().unwrap_or_default().to_string();

        let handles = creatives.iter().cloned().map(|creative| {
            let pipeline = self.pipeline.clone();
            tokio::spawn(async move { pipeline.process(&creative).await })
        });
        let results = join_all(handles).await;

        let mut outcomes = Vec::with_capacity(creatives.len());
        for (creative, result) in creatives.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let reason = e.to_string();
                    error!(url = %creative.url, error = %reason, "creative task aborted");
                    self.progress.errored(creative, &reason).await;
                    outcomes.push(ItemOutcome::Errored {
                        url: creative.url.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(ProcessedAd::new(ad_id, outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::stores::MemoryStore;
    use crate::testing::{ad_json, sample_record, CountingResource, MockExtractionClient, StaticHasher};
    use crate::types::creative::MediaType;
    use crate::types::document::{BulkReport, CreativeDocument};
    use async_trait::async_trait;

    struct PanickingDocumentStore;

    #[async_trait]
    impl DocumentStore for PanickingDocumentStore {
        async fn upsert_documents(&self, documents: &[CreativeDocument]) -> StoreResult<BulkReport> {
            Ok(BulkReport::all_succeeded(documents.len()))
        }

        async fn delete_for_page(&self, _page_id: &str) -> StoreResult<u64> {
            panic!("document store crashed");
        }
    }

    fn context(store: Arc<MemoryStore>, documents: Arc<dyn DocumentStore>) -> RunContext {
        let image = MockExtractionClient::new(MediaType::Image).with_default_record(sample_record());
        let video = MockExtractionClient::new(MediaType::Video).with_default_record(sample_record());
        RunContext::new(
            "page-1",
            Arc::new(StaticHasher::new().hash_by_url()),
            store.clone(),
            ExtractionRouter::new(Arc::new(image), Arc::new(video)).unwrap(),
            documents,
            store,
        )
    }

    fn ads(count: usize) -> Vec<AdRecord> {
        (0..count)
            .map(|i| {
                serde_json::from_value(ad_json(
                    &format!("ad-{i}"),
                    &[format!("https://cdn.example.com/{i}.jpg").as_str()],
                ))
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_counts_ads_and_releases_resources() {
        let store = Arc::new(MemoryStore::new());
        let resource = Arc::new(CountingResource::new("db"));
        let runner = JobRunner::new(
            context(store.clone(), store.clone())
                .with_resource(resource.clone())
                .with_job_config(JobConfig::default().with_flush_every_ads(2)),
        );

        let mut records = ads(3);
        records.push(serde_json::from_value(serde_json::json!({"status": "active"})).unwrap());

        let summary = runner.run(records).await.unwrap();
        assert_eq!(summary.total_ads, 4);
        assert_eq!(summary.successful_ads, 3);
        assert_eq!(summary.failed_ads, 1);
        assert_eq!(summary.completed_items, 3);
        assert_eq!(store.document_count().await, 3);
        assert_eq!(resource.release_count(), 1);

        let job = store.load("page-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completion.unwrap().successful_ads, 3);
    }

    #[tokio::test]
    async fn test_zero_flush_interval_flushes_every_ad() {
        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::new(
            context(store.clone(), store.clone())
                .with_job_config(JobConfig::default().with_flush_every_ads(0)),
        );

        let summary = runner.run(ads(2)).await.unwrap();
        assert_eq!(summary.successful_ads, 2);
        assert_eq!(store.document_count().await, 2);
    }

    #[tokio::test]
    async fn test_no_ads_fails_the_run() {
        let store = Arc::new(MemoryStore::new());
        let resource = Arc::new(CountingResource::new("db"));
        let runner = JobRunner::new(context(store.clone(), store.clone()).with_resource(resource.clone()));

        let err = runner.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, JobError::NoAds { ref page_id } if page_id == "page-1"));
        assert_eq!(resource.release_count(), 1);

        let job = store.load("page-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_panic_still_finalizes() {
        let store = Arc::new(MemoryStore::new());
        let resource = Arc::new(CountingResource::new("db"));
        let runner = JobRunner::new(
            context(store.clone(), Arc::new(PanickingDocumentStore)).with_resource(resource.clone()),
        );

        let err = runner.run(ads(1)).await.unwrap_err();
        assert!(matches!(err, JobError::Panicked(ref msg) if msg.contains("document store crashed")));
        assert_eq!(resource.release_count(), 1);

        let job = store.load("page-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_prior_results_are_replaced() {
        let store = Arc::new(MemoryStore::new());
        JobRunner::new(context(store.clone(), store.clone()))
            .run(ads(2))
            .await
            .unwrap();
        assert_eq!(store.document_count().await, 2);

        JobRunner::new(context(store.clone(), store.clone()))
            .run(ads(1))
            .await
            .unwrap();
        assert_eq!(store.document_count().await, 1);
    }
}
