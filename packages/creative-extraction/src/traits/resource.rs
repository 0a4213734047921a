//! Resources held for the duration of a run.

use async_trait::async_trait;

/// A connection or client that must be released when a run ends.
#[async_trait]
pub trait RunResource: Send + Sync {
    fn name(&self) -> &str;

    async fn release(&self);
}
