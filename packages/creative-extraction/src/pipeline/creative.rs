//! Per-creative processing.
//!
//! `pending -> hashing -> dedup_check -> {cache_hit | extracting} -> persisting
//! -> {completed | failed | error}`. A URL already being processed by another
//! task short-circuits to `Skipped` without side effects.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::single_flight::{HashLocks, InFlightSet};
use crate::providers::ExtractionRouter;
use crate::sink::BatchSink;
use crate::traits::hasher::ContentHasher;
use crate::traits::store::DedupStore;
use crate::types::brand::BrandProfile;
use crate::types::creative::{ContentHash, Creative};
use crate::types::document::ProcessedCreative;
use crate::types::job::ItemOutcome;
use crate::types::record::ExtractedRecord;

/// Processing stage of one creative, used for transition logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreativeState {
    Pending,
    Hashing,
    DedupCheck,
    CacheHit,
    Extracting,
    Persisting,
    Completed,
    Failed,
    Error,
}

impl CreativeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Hashing => "hashing",
            Self::DedupCheck => "dedup_check",
            Self::CacheHit => "cache_hit",
            Self::Extracting => "extracting",
            Self::Persisting => "persisting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

fn transition(creative: &Creative, state: CreativeState) {
    debug!(url = %creative.url, ad_id = %creative.ad_id(), state = state.as_str(), "creative transition");
}

/// Runs one creative through hash, dedup, extraction and persistence.
///
/// Shared by every task of a run; all collaborators are behind `Arc`.
pub struct CreativePipeline {
    hasher: Arc<dyn ContentHasher>,
    dedup: Arc<dyn DedupStore>,
    extractors: ExtractionRouter,
    sink: Arc<BatchSink>,
    progress: Arc<ProgressTracker>,
    brand: Arc<BrandProfile>,
    in_flight: InFlightSet,
    hash_locks: HashLocks,
}

impl CreativePipeline {
    pub fn new(
        hasher: Arc<dyn ContentHasher>,
        dedup: Arc<dyn DedupStore>,
        extractors: ExtractionRouter,
        sink: Arc<BatchSink>,
        progress: Arc<ProgressTracker>,
        brand: Arc<BrandProfile>,
    ) -> Self {
        Self {
            hasher,
            dedup,
            extractors,
            sink,
            progress,
            brand,
            in_flight: InFlightSet::new(),
            hash_locks: HashLocks::new(),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub fn sink(&self) -> &Arc<BatchSink> {
        &self.sink
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Process one creative. Never fails: every outcome is an `ItemOutcome`.
    pub async fn process(&self, creative: &Creative) -> ItemOutcome {
        transition(creative, CreativeState::Pending);
        let Some(_claim) = self.in_flight.try_claim(&creative.url) else {
            debug!(url = %creative.url, "creative already in flight, skipping");
            return ItemOutcome::Skipped {
                url: creative.url.clone(),
            };
        };

        self.progress.processing(creative).await;

        transition(creative, CreativeState::Hashing);
        let hash = match self.hasher.hash(&creative.url, creative.media_type).await {
            Ok(hash) => hash,
            Err(e) => {
                let reason = e.to_string();
                warn!(url = %creative.url, error = %reason, "failed to fetch creative");
                transition(creative, CreativeState::Error);
                self.progress.errored(creative, &reason).await;
                return ItemOutcome::Errored {
                    url: creative.url.clone(),
                    reason,
                };
            }
        };

        // Held through the dedup write so a concurrent twin sees the record
        let _hash_guard = self.hash_locks.lock(&hash).await;

        transition(creative, CreativeState::DedupCheck);
        let (record, reused) = match self.cached(creative, &hash).await {
            Some(record) => {
                transition(creative, CreativeState::CacheHit);
                info!(url = %creative.url, hash = %hash, "reusing stored analysis");
                (record, true)
            }
            None => {
                transition(creative, CreativeState::Extracting);
                match self.extractors.extract(creative, &self.brand).await {
                    Some(record) => (record, false),
                    None => {
                        warn!(url = %creative.url, media_type = %creative.media_type, "extraction failed");
                        transition(creative, CreativeState::Failed);
                        self.progress.failed(creative, "extraction failed").await;
                        return ItemOutcome::Failed {
                            url: creative.url.clone(),
                        };
                    }
                }
            }
        };

        transition(creative, CreativeState::Persisting);
        let processed = ProcessedCreative::new(creative.clone(), hash, record, reused);
        self.persist(&processed).await;

        transition(creative, CreativeState::Completed);
        self.progress.completed(creative).await;
        ItemOutcome::Completed(processed)
    }

    /// Store errors are treated as a miss.
    async fn cached(&self, creative: &Creative, hash: &ContentHash) -> Option<ExtractedRecord> {
        match self.dedup.lookup(hash, Some(creative.page_id())).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %creative.url, hash = %hash, error = %e, "dedup lookup failed, extracting");
                None
            }
        }
    }

    async fn persist(&self, processed: &ProcessedCreative) {
        let creative = &processed.creative;
        if self.sink.push(processed.clone()).await {
            self.sink.flush().await;
        }

        // On a hit this only refreshes linkage; the stored record is kept
        if let Err(e) = self
            .dedup
            .upsert(
                &processed.hash,
                &processed.record,
                Some(creative.page_id()),
                Some(&creative.url),
            )
            .await
        {
            warn!(url = %creative.url, hash = %processed.hash, error = %e, "failed to write dedup entry");
        }
    }
}
