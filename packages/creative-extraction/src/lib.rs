//! Content-Addressed Creative Extraction
//!
//! Turns the image and video creatives of a page's ads into structured
//! analysis records, persisted to a document store and an optional search
//! index.
//!
//! # How a creative is processed
//!
//! - Hashed by content (videos by a bounded prefix), so re-hosted copies
//!   collapse to one analysis
//! - Looked up in the dedup store; a hit reuses the stored record
//! - Otherwise sent to a provider: images fail over across endpoints, videos
//!   go through upload/poll/generate with rate-limited keys
//! - Queued in the batch sink and flushed in bulk
//!
//! # Usage
//!
//! ```rust,ignore
//! use creative_extraction::{JobRunner, RunContext, MemoryStore, ExtractionRouter};
//! use creative_extraction::testing::{MockExtractionClient, StaticHasher};
//!
//! let store = Arc::new(MemoryStore::new());
//! let router = ExtractionRouter::new(image_client, video_client)?;
//! let ctx = RunContext::new("page-1", hasher, store.clone(), router, store.clone(), store);
//! let summary = JobRunner::new(ctx).run(ads).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams for hashing, extraction, storage, search and resources
//! - [`types`] - Ads, creatives, records, documents and run state
//! - [`hasher`] - Streaming HTTP content hasher
//! - [`rotator`] - Credential rotation with cooldowns
//! - [`providers`] - Image and video extraction clients
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`search`] - Search index backends
//! - [`sink`] - Batched persistence
//! - [`pipeline`] - Per-creative processing and page runs
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod hasher;
pub mod pipeline;
pub mod providers;
pub mod rotator;
pub mod search;
pub mod security;
pub mod sink;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{FetchError, JobError, PipelineError, ProviderError, SinkError, StoreError};
pub use hasher::HttpContentHasher;
pub use pipeline::{CreativePipeline, JobRunner, ProgressTracker, RunContext};
pub use providers::{
    Backoff, BrandContextPrompt, ExtractionRouter, ImageClientConfig, ImageExtractionClient,
    VideoClientConfig, VideoExtractionClient,
};
pub use rotator::{Credential, KeyRotator, RotatorConfig};
pub use search::{ElasticsearchIndex, MemorySearchIndex};
pub use security::{ImageEndpoint, SecretString};
pub use sink::{BatchSink, FlushReport, SinkOutcome};
pub use stores::MemoryStore;
pub use traits::{
    extraction::{ExtractionClient, PromptBuilder},
    hasher::ContentHasher,
    resource::RunResource,
    search::SearchIndex,
    store::{DedupStore, DocumentStore, JobStatusStore},
};
pub use types::{
    ad::AdRecord,
    brand::BrandProfile,
    config::{HasherConfig, JobConfig, SinkConfig},
    creative::{ContentHash, Creative, MediaType},
    document::{BulkReport, CreativeDocument, DedupEntry, ProcessedCreative},
    job::{ItemOutcome, JobStatus, JobSummary, ProcessedAd, ProcessingJob},
    record::ExtractedRecord,
};

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;
