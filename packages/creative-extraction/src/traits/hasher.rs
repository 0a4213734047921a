//! Content hashing.

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::types::creative::{ContentHash, MediaType};

/// Computes a content digest for a creative URL.
///
/// Videos hash only a fixed-size prefix; images hash the whole body.
/// Failures are not retried here.
#[async_trait]
pub trait ContentHasher: Send + Sync {
    async fn hash(&self, url: &str, media_type: MediaType) -> FetchResult<ContentHash>;
}
