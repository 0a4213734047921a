//! Run state: the persisted status record and per-run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::creative::MediaType;
use crate::types::document::ProcessedCreative;

/// Externally visible state of a page run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    ProcessingAd,
    Processing,
    Completed,
    Failed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::ProcessingAd => "processing_ad",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Aggregate numbers written when a run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    pub total_ads: usize,
    pub successful_ads: usize,
    pub failed_ads: usize,
    /// Percentage, 0.0 to 100.0
    pub success_rate: f64,
}

/// Status record for one page run, persisted after every transition so
/// external callers can poll progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub run_id: Uuid,
    pub page_id: String,
    pub stage: String,
    pub status: JobStatus,

    pub current_creative: Option<String>,
    pub current_media_type: Option<MediaType>,
    pub last_completed_creative: Option<String>,
    pub last_failed_creative: Option<String>,
    pub last_error_creative: Option<String>,
    pub last_error: Option<String>,

    pub completed_count: u64,
    pub failed_count: u64,
    pub error_count: u64,

    pub total_ads: usize,
    pub current_ad: usize,
    pub current_ad_id: Option<String>,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion: Option<CompletionDetails>,
}

impl ProcessingJob {
    pub fn new(page_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            page_id: page_id.into(),
            stage: "analysis".to_string(),
            status: JobStatus::Started,
            current_creative: None,
            current_media_type: None,
            last_completed_creative: None,
            last_failed_creative: None,
            last_error_creative: None,
            last_error: None,
            completed_count: 0,
            failed_count: 0,
            error_count: 0,
            total_ads: 0,
            current_ad: 0,
            current_ad_id: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            completion: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// What happened to one creative.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// Persisted, either freshly extracted or reused from the dedup store
    Completed(ProcessedCreative),
    /// Every extraction attempt failed
    Failed { url: String },
    /// Fetch or another unexpected error
    Errored { url: String, reason: String },
    /// Another processor already held this URL
    Skipped { url: String },
}

impl ItemOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Completed(processed) => &processed.creative.url,
            Self::Failed { url } | Self::Errored { url, .. } | Self::Skipped { url } => url,
        }
    }
}

/// Result of processing every creative in one ad.
#[derive(Debug, Clone)]
pub struct ProcessedAd {
    pub ad_id: String,
    pub total_items: usize,
    pub processed_items: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl ProcessedAd {
    pub fn new(ad_id: impl Into<String>, outcomes: Vec<ItemOutcome>) -> Self {
        let processed_items = outcomes.iter().filter(|o| o.is_completed()).count();
        Self {
            ad_id: ad_id.into(),
            total_items: outcomes.len(),
            processed_items,
            outcomes,
        }
    }

    /// Successfully persisted creatives.
    pub fn extracted(&self) -> impl Iterator<Item = &ProcessedCreative> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Completed(processed) => Some(processed),
            _ => None,
        })
    }
}

/// Returned by a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub page_id: String,
    pub total_ads: usize,
    pub successful_ads: usize,
    pub failed_ads: usize,
    pub completed_items: usize,
    pub reused_items: usize,
    pub failed_items: usize,
    pub errored_items: usize,
    pub skipped_items: usize,
}

impl JobSummary {
    pub fn new(page_id: impl Into<String>, total_ads: usize) -> Self {
        Self {
            page_id: page_id.into(),
            total_ads,
            ..Default::default()
        }
    }

    pub fn record_ad(&mut self, ad: &ProcessedAd) {
        self.successful_ads += 1;
        for outcome in &ad.outcomes {
            match outcome {
                ItemOutcome::Completed(processed) => {
                    self.completed_items += 1;
                    if processed.reused_analysis {
                        self.reused_items += 1;
                    }
                }
                ItemOutcome::Failed { .. } => self.failed_items += 1,
                ItemOutcome::Errored { .. } => self.errored_items += 1,
                ItemOutcome::Skipped { .. } => self.skipped_items += 1,
            }
        }
    }

    pub fn record_ad_failure(&mut self) {
        self.failed_ads += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_ads == 0 {
            return 0.0;
        }
        self.successful_ads as f64 / self.total_ads as f64 * 100.0
    }

    pub fn completion(&self) -> CompletionDetails {
        CompletionDetails {
            total_ads: self.total_ads,
            successful_ads: self.successful_ads,
            failed_ads: self.failed_ads,
            success_rate: self.success_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_and_rate() {
        let mut summary = JobSummary::new("page-1", 4);
        summary.record_ad(&ProcessedAd::new(
            "a1",
            vec![
                ItemOutcome::Failed { url: "u1".into() },
                ItemOutcome::Skipped { url: "u2".into() },
            ],
        ));
        summary.record_ad(&ProcessedAd::new("a2", vec![]));
        summary.record_ad(&ProcessedAd::new(
            "a3",
            vec![ItemOutcome::Errored {
                url: "u3".into(),
                reason: "HTTP 404".into(),
            }],
        ));
        summary.record_ad_failure();

        assert_eq!(summary.successful_ads, 3);
        assert_eq!(summary.failed_ads, 1);
        assert_eq!(summary.failed_items, 1);
        assert_eq!(summary.skipped_items, 1);
        assert_eq!(summary.errored_items, 1);
        assert!((summary.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_summary_rate_is_zero() {
        assert_eq!(JobSummary::new("p", 0).success_rate(), 0.0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::ProcessingAd).unwrap();
        assert_eq!(json, "\"processing_ad\"");
        assert_eq!(JobStatus::ProcessingAd.as_str(), "processing_ad");
    }
}
