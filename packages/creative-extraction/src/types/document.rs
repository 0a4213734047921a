//! Persisted shapes: processed creatives, store documents and bulk reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::creative::{ContentHash, Creative, MediaType};
use crate::types::record::ExtractedRecord;

/// A creative that made it through extraction (or reuse) and is ready to
/// persist.
#[derive(Debug, Clone)]
pub struct ProcessedCreative {
    pub creative: Creative,
    pub hash: ContentHash,
    pub record: ExtractedRecord,
    /// True when the record came from the dedup store
    pub reused_analysis: bool,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedCreative {
    pub fn new(
        creative: Creative,
        hash: ContentHash,
        record: ExtractedRecord,
        reused_analysis: bool,
    ) -> Self {
        Self {
            creative,
            hash,
            record,
            reused_analysis,
            processed_at: Utc::now(),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.creative.media_type
    }

    /// Document-store form: the record plus ad-level metadata.
    pub fn to_document(&self) -> CreativeDocument {
        let ad = &self.creative.ad;
        let body = json!({
            "ad_id": ad.ad_id,
            "page_id": ad.page_id,
            "creative_url": self.creative.url,
            "media_type": self.creative.media_type,
            "carousel_position": self.creative.carousel_position,
            "hash": self.hash,
            "reused_analysis": self.reused_analysis,
            "extracted_entities": self.record,
            "status": ad.status,
            "start_date": ad.start_date,
            "end_date": ad.end_date,
            "active_duration": ad.active_duration,
            "platforms": ad.platforms,
            "advertiser": ad.advertiser,
            "description": ad.description,
            "ad_text": ad.ad_text,
            "ad_link": ad.ad_link,
            "ad_cta": ad.ad_cta,
            "cta_button": ad.cta_button,
            "variation_count": ad.variation_count,
            "timestamp": ad.timestamp,
            "processed_at": self.processed_at,
        });

        CreativeDocument {
            document_id: self.creative.document_id(),
            ad_id: ad.ad_id.clone(),
            page_id: ad.page_id.clone(),
            media_type: self.creative.media_type,
            hash: self.hash.clone(),
            body,
        }
    }
}

/// One record in the document store, upserted by `document_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeDocument {
    pub document_id: String,
    pub ad_id: String,
    pub page_id: String,
    pub media_type: MediaType,
    pub hash: ContentHash,
    pub body: Value,
}

/// One document bound for a search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub body: Value,
}

/// Dedup store row: extraction result keyed by content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupEntry {
    pub hash: ContentHash,
    pub extracted_record: ExtractedRecord,
    pub page_id: Option<String>,
    pub creative_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-item failure inside a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a bulk write. Partial failure is reported, not raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            succeeded: count,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
