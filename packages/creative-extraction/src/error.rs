//! Typed errors for the creative extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Extraction clients do
//! not surface these to callers: an exhausted extraction is reported as `None`
//! so the pipeline can record the creative as failed.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while fetching creative bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, reset, body read)
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Request exceeded its deadline
    #[error("timeout fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    /// Classify a reqwest error for the given URL.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Errors from a single provider call. Consumed by the retry loops inside
/// the extraction clients.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider answered 429
    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    /// Provider answered with another non-success status
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Call exceeded its deadline
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Response could not be parsed into a record
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Response carried no content
    #[error("empty response")]
    Empty,

    /// Uploaded asset never became usable
    #[error("asset processing failed: {0}")]
    Processing(String),

    /// Source asset could not be downloaded
    #[error("asset download failed: {0}")]
    Fetch(#[from] FetchError),
}

impl ProviderError {
    /// Map a reqwest error, keeping timeouts distinct.
    pub fn from_reqwest(source: reqwest::Error, timeout: Duration) -> Self {
        if source.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(source)
        }
    }
}

/// Errors from the dedup, document and status stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not reach the backing store
    #[error("store connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A query or write failed
    #[error("store query error: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the search index and batch sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Bulk write exceeded its deadline
    #[error("bulk write to {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    /// Transport-level failure
    #[error("search index HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the search index
    #[error("search index {target} returned HTTP {status}: {body}")]
    Status {
        target: String,
        status: u16,
        body: String,
    },

    /// Bulk response could not be understood
    #[error("malformed bulk response: {0}")]
    Malformed(String),

    /// Document store write failed
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the per-creative pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fetching bytes for hashing failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A sink operation failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Ad record is missing required fields
    #[error("invalid ad: {reason}")]
    InvalidAd { reason: String },

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),
}

/// Errors that end a whole job run.
#[derive(Debug, Error)]
pub enum JobError {
    /// Nothing to process for the page
    #[error("no ads found for page {page_id}")]
    NoAds { page_id: String },

    /// The run panicked; finalization still happened
    #[error("job panicked: {0}")]
    Panicked(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = FetchError::Status {
            url: "https://cdn.example.com/a.jpg".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "https://cdn.example.com/a.jpg returned HTTP 404");
    }

    #[test]
    fn test_fetch_error_converts_into_pipeline_error() {
        let err: PipelineError = FetchError::Timeout {
            url: "https://cdn.example.com/v.mp4".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::Fetch(FetchError::Timeout { .. })));
    }

    #[test]
    fn test_store_error_wraps_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(err.to_string().starts_with("serialization error"));
    }
}
