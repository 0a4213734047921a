//! Status record maintenance for a page run.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::traits::store::JobStatusStore;
use crate::types::creative::Creative;
use crate::types::job::{CompletionDetails, JobStatus, ProcessingJob};

/// Applies status transitions to the run's `ProcessingJob` and persists a
/// snapshot after each one. Persistence failures are logged only.
pub struct ProgressTracker {
    job: Mutex<ProcessingJob>,
    store: Arc<dyn JobStatusStore>,
}

impl ProgressTracker {
    pub fn new(page_id: impl Into<String>, store: Arc<dyn JobStatusStore>) -> Self {
        Self {
            job: Mutex::new(ProcessingJob::new(page_id)),
            store,
        }
    }

    pub async fn snapshot(&self) -> ProcessingJob {
        self.job.lock().await.clone()
    }

    async fn update(&self, apply: impl FnOnce(&mut ProcessingJob)) {
        let mut job = self.job.lock().await;
        apply(&mut job);
        job.updated_at = Utc::now();

        // Saved under the lock so snapshots reach the store in order
        if let Err(e) = self.store.save(&job).await {
            warn!(page_id = %job.page_id, status = job.status.as_str(), error = %e, "failed to persist job status");
        } else {
            debug!(page_id = %job.page_id, status = job.status.as_str(), "job status persisted");
        }
    }

    pub async fn started(&self, total_ads: usize) {
        self.update(|job| {
            job.status = JobStatus::Started;
            job.total_ads = total_ads;
        })
        .await;
    }

    pub async fn processing_ad(&self, position: usize, ad_id: Option<&str>) {
        self.update(|job| {
            job.status = JobStatus::ProcessingAd;
            job.current_ad = position;
            job.current_ad_id = ad_id.map(str::to_string);
        })
        .await;
    }

    pub async fn processing(&self, creative: &Creative) {
        self.update(|job| {
            job.status = JobStatus::Processing;
            job.current_creative = Some(creative.url.clone());
            job.current_media_type = Some(creative.media_type);
        })
        .await;
    }

    pub async fn completed(&self, creative: &Creative) {
        self.update(|job| {
            job.status = JobStatus::Completed;
            job.completed_count += 1;
            job.last_completed_creative = Some(creative.url.clone());
            job.current_media_type = Some(creative.media_type);
        })
        .await;
    }

    pub async fn failed(&self, creative: &Creative, reason: &str) {
        self.update(|job| {
            job.status = JobStatus::Failed;
            job.failed_count += 1;
            job.last_failed_creative = Some(creative.url.clone());
            job.last_error = Some(reason.to_string());
        })
        .await;
    }

    pub async fn errored(&self, creative: &Creative, reason: &str) {
        self.update(|job| {
            job.status = JobStatus::Error;
            job.error_count += 1;
            job.last_error_creative = Some(creative.url.clone());
            job.last_error = Some(reason.to_string());
        })
        .await;
    }

    /// Run finished normally.
    pub async fn finished(&self, completion: CompletionDetails) {
        self.update(|job| {
            job.status = JobStatus::Completed;
            job.current_creative = None;
            job.completed_at = Some(Utc::now());
            job.completion = Some(completion);
        })
        .await;
    }

    /// Run ended early: `Failed` for an empty page, `Error` for a crash.
    pub async fn aborted(&self, status: JobStatus, reason: &str) {
        self.update(|job| {
            job.status = status;
            job.current_creative = None;
            job.last_error = Some(reason.to_string());
            job.completed_at = Some(Utc::now());
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::creative;
    use crate::types::creative::MediaType;

    #[tokio::test]
    async fn test_counts_and_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ProgressTracker::new("page-1", store.clone());
        let image = creative("ad-1", "https://cdn.example.com/a.jpg", MediaType::Image);

        tracker.started(2).await;
        tracker.processing(&image).await;
        tracker.completed(&image).await;
        tracker.failed(&image, "extraction failed").await;
        tracker.errored(&image, "HTTP 404").await;

        let job = store.load("page-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.completed_count, 1);
        assert_eq!(job.failed_count, 1);
        assert_eq!(job.error_count, 1);
        assert_eq!(job.last_error.as_deref(), Some("HTTP 404"));
        assert_eq!(job.total_ads, 2);

        let history = store.job_history().await;
        assert_eq!(history.len(), 5);
        assert_eq!(history[1].status, JobStatus::Processing);
        assert_eq!(
            history[1].current_creative.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[tokio::test]
    async fn test_store_failure_does_not_propagate() {
        let store = Arc::new(crate::testing::FailingStatusStore);
        let tracker = ProgressTracker::new("page-1", store);
        tracker.started(1).await;
        tracker.finished(CompletionDetails {
            total_ads: 1,
            successful_ads: 1,
            failed_ads: 0,
            success_rate: 100.0,
        })
        .await;

        let job = tracker.snapshot().await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.is_finished());
    }
}
