//! Configuration for hashing, batching and job runs.
//!
//! Provider and rotator settings live next to their clients.

use std::time::Duration;

use crate::providers::backoff::Backoff;

/// Configuration for content hashing.
#[derive(Debug, Clone)]
pub struct HasherConfig {
    /// Bytes of a video that are hashed before the stream is dropped.
    ///
    /// Default: 262144 (512 * 512).
    pub video_prefix_bytes: usize,

    /// Deadline for one fetch. Default: 60 seconds.
    pub request_timeout: Duration,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            video_prefix_bytes: 512 * 512,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl HasherConfig {
    pub fn with_video_prefix_bytes(mut self, bytes: usize) -> Self {
        self.video_prefix_bytes = bytes;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Configuration for the batch sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Items per batch before `push` asks for a flush. Default: 100.
    pub capacity: usize,

    /// Deadline for each bulk write, retries included. Default: 1000 seconds.
    pub bulk_timeout: Duration,

    /// Retries for document-store writes. Default: 5 attempts, 1s doubling,
    /// capped at 10s.
    pub store_retry: Backoff,

    /// Search index for image creatives.
    pub image_index: String,

    /// Search index for video creatives.
    pub video_index: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            bulk_timeout: Duration::from_secs(1000),
            store_retry: Backoff::new(5, Duration::from_secs(1)).with_max_delay(Duration::from_secs(10)),
            image_index: "image_competitors_analysis".to_string(),
            video_index: "video_competitors_analysis".to_string(),
        }
    }
}

impl SinkConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    pub fn with_store_retry(mut self, retry: Backoff) -> Self {
        self.store_retry = retry;
        self
    }

    pub fn with_indexes(mut self, image: impl Into<String>, video: impl Into<String>) -> Self {
        self.image_index = image.into();
        self.video_index = video.into();
        self
    }
}

/// Configuration for a page run.
#[derive(Debug, Clone)]
pub struct JobConfig {
    // Never zero; only set through the clamping builder
    flush_every_ads: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { flush_every_ads: 5 }
    }
}

impl JobConfig {
    pub fn with_flush_every_ads(mut self, ads: usize) -> Self {
        self.flush_every_ads = ads.max(1);
        self
    }

    /// Flush the sink after this many ads, and after the last one. Default: 5.
    pub fn flush_every_ads(&self) -> usize {
        self.flush_every_ads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_interval_never_zero() {
        assert_eq!(JobConfig::default().flush_every_ads(), 5);
        assert_eq!(JobConfig::default().with_flush_every_ads(0).flush_every_ads(), 1);
    }

    #[test]
    fn test_store_retry_defaults() {
        let retry = SinkConfig::default().store_retry;
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(5), Duration::from_secs(10));
    }
}
