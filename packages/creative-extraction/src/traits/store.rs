//! Storage traits for dedup entries, creative documents and run status.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::creative::ContentHash;
use crate::types::document::{BulkReport, CreativeDocument, DedupEntry};
use crate::types::job::ProcessingJob;
use crate::types::record::ExtractedRecord;

/// Content-addressed cache of extraction results.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Find a record for `hash`.
    ///
    /// With a `page_id`, an entry linked to that page is preferred; any
    /// entry for the hash is accepted as a fallback.
    async fn lookup(
        &self,
        hash: &ContentHash,
        page_id: Option<&str>,
    ) -> StoreResult<Option<ExtractedRecord>>;

    /// Insert or update the entry for `hash`.
    ///
    /// On conflict the stored record is kept; only the linkage fields and
    /// `updated_at` change.
    async fn upsert(
        &self,
        hash: &ContentHash,
        record: &ExtractedRecord,
        page_id: Option<&str>,
        creative_url: Option<&str>,
    ) -> StoreResult<()>;

    /// Full entry for `hash`, if any.
    async fn entry(&self, hash: &ContentHash) -> StoreResult<Option<DedupEntry>>;
}

/// Per-ad document collection, upserted by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_documents(&self, documents: &[CreativeDocument]) -> StoreResult<BulkReport>;

    /// Remove every document for a page. Returns the number removed.
    async fn delete_for_page(&self, page_id: &str) -> StoreResult<u64>;
}

/// Persistence for the status record external callers poll.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    async fn save(&self, job: &ProcessingJob) -> StoreResult<()>;

    async fn load(&self, page_id: &str) -> StoreResult<Option<ProcessingJob>>;
}
