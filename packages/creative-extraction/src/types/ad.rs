//! Raw ad records as stored per page, and their expansion into creatives.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::types::creative::{AdMetadata, Creative, MediaType};

/// One ad as scraped from the ad library.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub library_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub active_duration: Option<Value>,
    #[serde(default, deserialize_with = "string_list")]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub advertiser: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ad_text: Option<String>,
    #[serde(default)]
    pub ad_link: Option<String>,
    #[serde(default)]
    pub ad_cta: Option<String>,
    #[serde(default)]
    pub cta_button: Option<String>,
    #[serde(default)]
    pub variation_count: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "media_list")]
    pub media_details: Vec<MediaItem>,

    // Older scrapes carry media directly on the ad
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub asset_feed_spec: Option<AssetFeedSpec>,
}

/// One entry of `media_details`, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaItem {
    Image {
        #[serde(default)]
        image_src: Option<String>,
    },
    Video {
        #[serde(default)]
        url: Option<String>,
    },
    Carousel {
        #[serde(default, deserialize_with = "lenient_list")]
        items: Vec<CarouselItem>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarouselItem {
    #[serde(default)]
    pub image_src: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetFeedSpec {
    #[serde(default)]
    pub images: Vec<AssetImage>,
    #[serde(default)]
    pub videos: Vec<AssetVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetImage {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetVideo {
    #[serde(default)]
    pub video_url: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// `media_details` entries that don't parse (no `type`, wrong shape) become
/// `Unsupported` so the rest of the ad survives; `null` reads as empty.
fn media_list<'de, D>(deserializer: D) -> std::result::Result<Vec<MediaItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or(MediaItem::Unsupported))
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    })
}

impl AdRecord {
    pub fn ad_id(&self) -> Option<&str> {
        self.library_id.as_deref()
    }

    /// Ad-level fields copied onto every creative of this ad.
    pub fn metadata(&self, page_id: &str) -> Result<AdMetadata> {
        let ad_id = self.library_id.clone().ok_or_else(|| PipelineError::InvalidAd {
            reason: "missing library_id".into(),
        })?;

        Ok(AdMetadata {
            ad_id,
            page_id: page_id.to_string(),
            status: self.status.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            active_duration: self.active_duration.clone(),
            platforms: self.platforms.clone(),
            advertiser: self.advertiser.clone(),
            description: self.description.clone(),
            ad_text: self.ad_text.clone(),
            ad_link: self.ad_link.clone(),
            ad_cta: self.ad_cta.clone(),
            cta_button: self.cta_button.clone(),
            variation_count: self.variation_count.clone(),
            timestamp: self.timestamp.clone(),
        })
    }

    /// Expand the ad into its creatives, in document order.
    ///
    /// `media_details` wins when present; otherwise the legacy fields are
    /// consulted. Entries without a URL and unknown media kinds are dropped.
    pub fn creatives(&self, page_id: &str) -> Result<Vec<Creative>> {
        let ad = Arc::new(self.metadata(page_id)?);
        let mut creatives = Vec::new();

        if !self.media_details.is_empty() {
            for item in &self.media_details {
                match item {
                    MediaItem::Image { image_src: Some(url) } => {
                        creatives.push(Creative::new(url, MediaType::Image, ad.clone()));
                    }
                    MediaItem::Video { url: Some(url) } => {
                        creatives.push(Creative::new(url, MediaType::Video, ad.clone()));
                    }
                    MediaItem::Carousel { items } => {
                        let urls = items.iter().filter_map(|i| i.image_src.as_ref());
                        for (position, url) in urls.enumerate() {
                            creatives.push(
                                Creative::new(url, MediaType::Image, ad.clone())
                                    .in_carousel(position),
                            );
                        }
                    }
                    _ => {}
                }
            }
            return Ok(creatives);
        }

        if let Some(url) = &self.image_url {
            creatives.push(Creative::new(url, MediaType::Image, ad.clone()));
        }
        if let Some(url) = &self.video_url {
            creatives.push(Creative::new(url, MediaType::Video, ad.clone()));
        }
        if let Some(feed) = &self.asset_feed_spec {
            for url in feed.images.iter().filter_map(|i| i.image_url.as_ref()) {
                creatives.push(Creative::new(url, MediaType::Image, ad.clone()));
            }
            for url in feed.videos.iter().filter_map(|v| v.video_url.as_ref()) {
                creatives.push(Creative::new(url, MediaType::Video, ad.clone()));
            }
        }

        Ok(creatives)
    }
}
