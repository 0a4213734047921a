//! Creatives and their content hashes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Media kind of a creative. Selects both the extraction client and the
/// search index a creative lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ad-level metadata shared by every creative of one ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdMetadata {
    pub ad_id: String,
    pub page_id: String,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub active_duration: Option<serde_json::Value>,
    pub platforms: Vec<String>,
    pub advertiser: Option<String>,
    pub description: Option<String>,
    pub ad_text: Option<String>,
    pub ad_link: Option<String>,
    pub ad_cta: Option<String>,
    pub cta_button: Option<String>,
    pub variation_count: Option<serde_json::Value>,
    pub timestamp: Option<serde_json::Value>,
}

/// One media asset belonging to an ad.
#[derive(Debug, Clone)]
pub struct Creative {
    pub url: String,
    pub media_type: MediaType,
    /// Zero-based position inside a carousel, if the creative came from one
    pub carousel_position: Option<usize>,
    pub ad: Arc<AdMetadata>,
}

impl Creative {
    pub fn new(url: impl Into<String>, media_type: MediaType, ad: Arc<AdMetadata>) -> Self {
        Self {
            url: url.into(),
            media_type,
            carousel_position: None,
            ad,
        }
    }

    pub fn in_carousel(mut self, position: usize) -> Self {
        self.carousel_position = Some(position);
        self
    }

    pub fn ad_id(&self) -> &str {
        &self.ad.ad_id
    }

    pub fn page_id(&self) -> &str {
        &self.ad.page_id
    }

    /// Stable key for the per-ad document: one document per (ad, asset url).
    pub fn document_id(&self) -> String {
        let digest = format!("{:x}", Sha256::digest(self.url.as_bytes()));
        format!("{}:{}", self.ad.ad_id, &digest[..16])
    }
}

/// Hex SHA-256 digest identifying creative content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a complete byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(bytes))
    }

    /// Finish a running SHA-256 computation.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentHash {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

impl From<&str> for ContentHash {
    fn from(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(ad_id: &str) -> Arc<AdMetadata> {
        Arc::new(AdMetadata {
            ad_id: ad_id.to_string(),
            page_id: "page-1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_hash_is_lowercase_hex() {
        let hash = ContentHash::of_bytes(b"abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_document_id_is_per_ad_and_url() {
        let a = Creative::new("https://cdn.example.com/1.jpg", MediaType::Image, ad("ad-1"));
        let b = Creative::new("https://cdn.example.com/2.jpg", MediaType::Image, ad("ad-1"));
        let c = Creative::new("https://cdn.example.com/1.jpg", MediaType::Image, ad("ad-2"));

        assert_eq!(a.document_id(), a.clone().document_id());
        assert_ne!(a.document_id(), b.document_id());
        assert_ne!(a.document_id(), c.document_id());
        assert!(a.document_id().starts_with("ad-1:"));
    }

    #[test]
    fn test_media_type_serde() {
        assert_eq!(serde_json::to_string(&MediaType::Video).unwrap(), "\"video\"");
        let parsed: MediaType = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(parsed, MediaType::Image);
    }
}
