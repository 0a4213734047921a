//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::{DedupStore, DocumentStore, JobStatusStore};
use crate::types::creative::ContentHash;
use crate::types::document::{BulkReport, CreativeDocument, DedupEntry};
use crate::types::job::ProcessingJob;
use crate::types::record::ExtractedRecord;

/// In-memory dedup entries, documents and status records.
///
/// Useful for testing and development. Data is lost on restart.
pub struct MemoryStore {
    dedup: RwLock<HashMap<ContentHash, DedupEntry>>,
    documents: RwLock<HashMap<String, CreativeDocument>>,
    jobs: RwLock<HashMap<String, ProcessingJob>>,
    job_history: RwLock<Vec<ProcessingJob>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            dedup: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            job_history: RwLock::new(Vec::new()),
        }
    }

    pub async fn dedup_count(&self) -> usize {
        self.dedup.read().await.len()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn documents_for_ad(&self, ad_id: &str) -> Vec<CreativeDocument> {
        self.documents
            .read()
            .await
            .values()
            .filter(|doc| doc.ad_id == ad_id)
            .cloned()
            .collect()
    }

    /// Every status snapshot saved so far, oldest first.
    pub async fn job_history(&self) -> Vec<ProcessingJob> {
        self.job_history.read().await.clone()
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn lookup(
        &self,
        hash: &ContentHash,
        _page_id: Option<&str>,
    ) -> StoreResult<Option<ExtractedRecord>> {
        // One entry per hash, so the page-linked match and the fallback coincide
        Ok(self
            .dedup
            .read()
            .await
            .get(hash)
            .map(|entry| entry.extracted_record.clone()))
    }

    async fn upsert(
        &self,
        hash: &ContentHash,
        record: &ExtractedRecord,
        page_id: Option<&str>,
        creative_url: Option<&str>,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let mut dedup = self.dedup.write().await;
        dedup
            .entry(hash.clone())
            .and_modify(|entry| {
                if let Some(page_id) = page_id {
                    entry.page_id = Some(page_id.to_string());
                }
                if let Some(url) = creative_url {
                    entry.creative_url = Some(url.to_string());
                }
                entry.updated_at = now;
            })
            .or_insert_with(|| DedupEntry {
                hash: hash.clone(),
                extracted_record: record.clone(),
                page_id: page_id.map(str::to_string),
                creative_url: creative_url.map(str::to_string),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn entry(&self, hash: &ContentHash) -> StoreResult<Option<DedupEntry>> {
        Ok(self.dedup.read().await.get(hash).cloned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_documents(&self, documents: &[CreativeDocument]) -> StoreResult<BulkReport> {
        let mut stored = self.documents.write().await;
        for doc in documents {
            stored.insert(doc.document_id.clone(), doc.clone());
        }
        Ok(BulkReport::all_succeeded(documents.len()))
    }

    async fn delete_for_page(&self, page_id: &str) -> StoreResult<u64> {
        let mut stored = self.documents.write().await;
        let before = stored.len();
        stored.retain(|_, doc| doc.page_id != page_id);
        Ok((before - stored.len()) as u64)
    }
}

#[async_trait]
impl JobStatusStore for MemoryStore {
    async fn save(&self, job: &ProcessingJob) -> StoreResult<()> {
        self.jobs
            .write()
            .await
            .insert(job.page_id.clone(), job.clone());
        self.job_history.write().await.push(job.clone());
        Ok(())
    }

    async fn load(&self, page_id: &str) -> StoreResult<Option<ProcessingJob>> {
        Ok(self.jobs.read().await.get(page_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::creative::MediaType;
    use serde_json::json;

    fn record(title: &str) -> ExtractedRecord {
        ExtractedRecord::from_value(json!({ "title": title })).unwrap()
    }

    fn document(id: &str, page_id: &str) -> CreativeDocument {
        CreativeDocument {
            document_id: id.to_string(),
            ad_id: "ad-1".to_string(),
            page_id: page_id.to_string(),
            media_type: MediaType::Image,
            hash: ContentHash::of_bytes(id.as_bytes()),
            body: json!({}),
        }
    }

    #[tokio::test]
    async fn test_dedup_upsert_keeps_first_record() {
        let store = MemoryStore::new();
        let hash = ContentHash::of_bytes(b"creative");

        store
            .upsert(&hash, &record("first"), Some("page-1"), Some("https://a"))
            .await
            .unwrap();
        store
            .upsert(&hash, &record("second"), Some("page-2"), Some("https://b"))
            .await
            .unwrap();

        let entry = store.entry(&hash).await.unwrap().unwrap();
        assert_eq!(entry.extracted_record, record("first"));
        assert_eq!(entry.page_id.as_deref(), Some("page-2"));
        assert_eq!(entry.creative_url.as_deref(), Some("https://b"));
        assert!(entry.updated_at >= entry.created_at);
        assert_eq!(store.dedup_count().await, 1);

        let found = store.lookup(&hash, Some("page-9")).await.unwrap();
        assert_eq!(found, Some(record("first")));
    }

    #[tokio::test]
    async fn test_documents_upsert_and_delete_by_page() {
        let store = MemoryStore::new();
        store
            .upsert_documents(&[document("d1", "p1"), document("d2", "p1"), document("d3", "p2")])
            .await
            .unwrap();
        store.upsert_documents(&[document("d1", "p1")]).await.unwrap();
        assert_eq!(store.document_count().await, 3);

        assert_eq!(store.delete_for_page("p1").await.unwrap(), 2);
        assert_eq!(store.document_count().await, 1);
    }

    #[tokio::test]
    async fn test_job_status_roundtrip() {
        let store = MemoryStore::new();
        let mut job = ProcessingJob::new("page-1");
        store.save(&job).await.unwrap();
        job.completed_count = 3;
        store.save(&job).await.unwrap();

        let loaded = store.load("page-1").await.unwrap().unwrap();
        assert_eq!(loaded.completed_count, 3);
        assert_eq!(store.job_history().await.len(), 2);
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
