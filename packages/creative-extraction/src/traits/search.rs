//! Search index abstraction.

use async_trait::async_trait;

use crate::error::SinkResult;
use crate::types::creative::MediaType;
use crate::types::document::{BulkReport, SearchDocument};

/// A search backend with one index per media type.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create `index` with the mapping for `media_type` if it does not exist.
    async fn ensure_index(&self, index: &str, media_type: MediaType) -> SinkResult<()>;

    /// Index documents, replacing any with the same id.
    async fn bulk_index(&self, index: &str, documents: &[SearchDocument]) -> SinkResult<BulkReport>;

    /// Remove every document for a page. Returns the number removed.
    async fn delete_for_page(&self, index: &str, page_id: &str) -> SinkResult<u64>;
}
