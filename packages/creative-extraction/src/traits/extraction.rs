//! Extraction providers and prompt construction.

use async_trait::async_trait;

use crate::types::brand::BrandProfile;
use crate::types::creative::{Creative, MediaType};
use crate::types::record::ExtractedRecord;

/// Sends one creative to a provider and returns its structured record.
///
/// Retries, failover and backoff happen inside the client. `None` means
/// every attempt failed; callers record the creative as failed.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Media type this client handles.
    fn capability(&self) -> MediaType;

    async fn extract(&self, creative: &Creative, brand: &BrandProfile) -> Option<ExtractedRecord>;
}

/// Builds the instruction text sent alongside a creative.
pub trait PromptBuilder: Send + Sync {
    fn build(&self, creative: &Creative, brand: &BrandProfile) -> String;
}
