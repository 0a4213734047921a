//! In-memory search index for tests and local runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::{SinkError, SinkResult};
use crate::traits::search::SearchIndex;
use crate::types::creative::MediaType;
use crate::types::document::{BulkFailure, BulkReport, SearchDocument};

/// Stores indexed documents in maps keyed by index name and document id.
#[derive(Default)]
pub struct MemorySearchIndex {
    indexes: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
    rejected_ids: RwLock<HashSet<String>>,
    ensure_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
    fail_bulk: AtomicBool,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject these document ids in bulk writes, as a per-item failure.
    pub async fn reject_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected_ids
            .write()
            .await
            .extend(ids.into_iter().map(Into::into));
    }

    /// Make every bulk call fail outright.
    pub fn fail_bulk_writes(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    pub async fn document_count(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map_or(0, HashMap::len)
    }

    pub async fn has_index(&self, index: &str) -> bool {
        self.indexes.read().await.contains_key(index)
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<serde_json::Value> {
        self.indexes.read().await.get(index)?.get(id).cloned()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn ensure_index(&self, index: &str, _media_type: MediaType) -> SinkResult<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        self.indexes
            .write()
            .await
            .entry(index.to_string())
            .or_default();
        Ok(())
    }

    async fn bulk_index(&self, index: &str, documents: &[SearchDocument]) -> SinkResult<BulkReport> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(SinkError::Status {
                target: index.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let rejected = self.rejected_ids.read().await;
        let mut indexes = self.indexes.write().await;
        let stored = indexes.entry(index.to_string()).or_default();
        let mut report = BulkReport::default();

        for doc in documents {
            if rejected.contains(&doc.id) {
                report.failures.push(BulkFailure {
                    id: doc.id.clone(),
                    reason: "mapper_parsing_exception".to_string(),
                });
                continue;
            }
            stored.insert(doc.id.clone(), doc.body.clone());
            report.succeeded += 1;
        }
        Ok(report)
    }

    async fn delete_for_page(&self, index: &str, page_id: &str) -> SinkResult<u64> {
        let mut indexes = self.indexes.write().await;
        let Some(stored) = indexes.get_mut(index) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|_, body| body.get("page_id").and_then(|v| v.as_str()) != Some(page_id));
        Ok((before - stored.len()) as u64)
    }
}
