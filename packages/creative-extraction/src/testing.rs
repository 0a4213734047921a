//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making provider calls or fetching real assets.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{FetchError, FetchResult, StoreError, StoreResult};
use crate::traits::extraction::ExtractionClient;
use crate::traits::hasher::ContentHasher;
use crate::traits::resource::RunResource;
use crate::traits::store::{DedupStore, DocumentStore, JobStatusStore};
use crate::types::brand::BrandProfile;
use crate::types::creative::{AdMetadata, ContentHash, Creative, MediaType};
use crate::types::document::{BulkReport, CreativeDocument, DedupEntry, ProcessedCreative};
use crate::types::job::ProcessingJob;
use crate::types::record::ExtractedRecord;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A creative of `ad_id` on page `page-1`.
pub fn creative(ad_id: &str, url: &str, media_type: MediaType) -> Creative {
    let ad = AdMetadata {
        ad_id: ad_id.to_string(),
        page_id: "page-1".to_string(),
        status: Some("active".to_string()),
        ..Default::default()
    };
    Creative::new(url, media_type, Arc::new(ad))
}

/// A freshly extracted creative carrying `sample_record`.
pub fn processed_creative(ad_id: &str, url: &str, media_type: MediaType) -> ProcessedCreative {
    ProcessedCreative::new(
        creative(ad_id, url, media_type),
        ContentHash::of_bytes(url.as_bytes()),
        sample_record(),
        false,
    )
}

pub fn sample_record() -> ExtractedRecord {
    ExtractedRecord::from_value(json!({
        "title": "Summer Sale",
        "hook": "Half off everything",
        "keywords": ["sale", "summer"],
        "product_categories": ["apparel"]
    }))
    .expect("sample record is a non-empty object")
}

/// Ad JSON as stored per page. URLs ending in `.mp4` become video items,
/// everything else an image item.
pub fn ad_json(ad_id: &str, urls: &[&str]) -> Value {
    let media: Vec<Value> = urls
        .iter()
        .map(|url| {
            if url.ends_with(".mp4") {
                json!({"type": "video", "url": url})
            } else {
                json!({"type": "image", "image_src": url})
            }
        })
        .collect();

    json!({
        "library_id": ad_id,
        "status": "active",
        "start_date": "01 Jan 2024",
        "platforms": ["facebook", "instagram"],
        "description": "Limited time offer",
        "cta_button": "Shop now",
        "media_details": media,
    })
}

/// A mock extraction client with per-URL responses.
///
/// URLs without a configured record fall back to the default record, or
/// fail (`None`) when no default is set.
pub struct MockExtractionClient {
    media_type: MediaType,
    records: Mutex<HashMap<String, ExtractedRecord>>,
    default_record: Option<ExtractedRecord>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockExtractionClient {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            records: Mutex::new(HashMap::new()),
            default_record: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_record(self, url: impl Into<String>, record: ExtractedRecord) -> Self {
        lock(&self.records).insert(url.into(), record);
        self
    }

    pub fn with_default_record(mut self, record: ExtractedRecord) -> Self {
        self.default_record = Some(record);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs extracted so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl ExtractionClient for MockExtractionClient {
    fn capability(&self) -> MediaType {
        self.media_type
    }

    async fn extract(&self, creative: &Creative, _brand: &BrandProfile) -> Option<ExtractedRecord> {
        lock(&self.calls).push(creative.url.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let configured = lock(&self.records).get(&creative.url).cloned();
        configured.or_else(|| self.default_record.clone())
    }
}

/// A content hasher answering from a URL-to-hash table.
///
/// Unknown URLs fail with HTTP 404 unless `hash_by_url` is set, in which
/// case the URL itself is hashed.
#[derive(Default)]
pub struct StaticHasher {
    hashes: HashMap<String, ContentHash>,
    failing: HashSet<String>,
    by_url: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hash(mut self, url: impl Into<String>, hash: impl Into<ContentHash>) -> Self {
        self.hashes.insert(url.into(), hash.into());
        self
    }

    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn hash_by_url(mut self) -> Self {
        self.by_url = true;
        self
    }

    /// Sleep before answering, to hold creatives in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentHasher for StaticHasher {
    async fn hash(&self, url: &str, _media_type: MediaType) -> FetchResult<ContentHash> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        match self.hashes.get(url) {
            Some(hash) => Ok(hash.clone()),
            None if self.by_url => Ok(ContentHash::of_bytes(url.as_bytes())),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// A document store whose writes take `delay`.
pub struct SlowDocumentStore {
    delay: Duration,
}

impl SlowDocumentStore {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl DocumentStore for SlowDocumentStore {
    async fn upsert_documents(&self, documents: &[CreativeDocument]) -> StoreResult<BulkReport> {
        tokio::time::sleep(self.delay).await;
        Ok(BulkReport::all_succeeded(documents.len()))
    }

    async fn delete_for_page(&self, _page_id: &str) -> StoreResult<u64> {
        Ok(0)
    }
}

/// A document store that fails its first `failures` writes.
pub struct FlakyDocumentStore {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyDocumentStore {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn upsert_documents(&self, documents: &[CreativeDocument]) -> StoreResult<BulkReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(unavailable());
        }
        Ok(BulkReport::all_succeeded(documents.len()))
    }

    async fn delete_for_page(&self, _page_id: &str) -> StoreResult<u64> {
        Ok(0)
    }
}

fn unavailable() -> StoreError {
    StoreError::Connection("store unavailable".into())
}

/// A dedup store that is always unreachable.
pub struct FailingDedupStore;

#[async_trait]
impl DedupStore for FailingDedupStore {
    async fn lookup(
        &self,
        _hash: &ContentHash,
        _page_id: Option<&str>,
    ) -> StoreResult<Option<ExtractedRecord>> {
        Err(unavailable())
    }

    async fn upsert(
        &self,
        _hash: &ContentHash,
        _record: &ExtractedRecord,
        _page_id: Option<&str>,
        _creative_url: Option<&str>,
    ) -> StoreResult<()> {
        Err(unavailable())
    }

    async fn entry(&self, _hash: &ContentHash) -> StoreResult<Option<DedupEntry>> {
        Err(unavailable())
    }
}

/// A status store that is always unreachable.
pub struct FailingStatusStore;

#[async_trait]
impl JobStatusStore for FailingStatusStore {
    async fn save(&self, _job: &ProcessingJob) -> StoreResult<()> {
        Err(unavailable())
    }

    async fn load(&self, _page_id: &str) -> StoreResult<Option<ProcessingJob>> {
        Err(unavailable())
    }
}

/// Counts how often it was released.
pub struct CountingResource {
    name: String,
    releases: AtomicUsize,
}

impl CountingResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunResource for CountingResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
