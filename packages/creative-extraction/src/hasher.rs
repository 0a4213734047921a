//! HTTP content hashing.
//!
//! Streams the creative body and feeds it into SHA-256. Videos stop after a
//! fixed prefix so large assets are never fully downloaded just to be hashed.

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::traits::hasher::ContentHasher;
use crate::types::config::HasherConfig;
use crate::types::creative::{ContentHash, MediaType};

/// Hashes creatives fetched over HTTP.
pub struct HttpContentHasher {
    client: reqwest::Client,
    config: HasherConfig,
}

impl Default for HttpContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpContentHasher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            config: HasherConfig::default(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_config(mut self, config: HasherConfig) -> Self {
        self.config = config;
        self
    }

    fn byte_limit(&self, media_type: MediaType) -> Option<usize> {
        match media_type {
            MediaType::Video => Some(self.config.video_prefix_bytes),
            MediaType::Image => None,
        }
    }
}

#[async_trait]
impl ContentHasher for HttpContentHasher {
    async fn hash(&self, url: &str, media_type: MediaType) -> FetchResult<ContentHash> {
        debug!(url = %url, media_type = %media_type, "hashing creative");

        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "hash fetch failed");
                FetchError::from_reqwest(url, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.byte_limit(media_type);
        let mut hasher = Sha256::new();
        let mut read = 0usize;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
            let take = match limit {
                Some(limit) => chunk.len().min(limit - read),
                None => chunk.len(),
            };
            hasher.update(&chunk[..take]);
            read += take;

            if limit.is_some_and(|limit| read >= limit) {
                break;
            }
        }

        let hash = ContentHash::from_hasher(hasher);
        debug!(url = %url, bytes = read, hash = %hash, "creative hashed");
        Ok(hash)
    }
}

/// Hash of the first `limit` bytes of `bytes`, matching what
/// [`HttpContentHasher`] computes for a video with that prefix size.
pub fn prefix_hash(bytes: &[u8], limit: usize) -> ContentHash {
    ContentHash::of_bytes(&bytes[..bytes.len().min(limit)])
}
