//! Search document normalization.
//!
//! Extracted fields pass through as-is; fields the index expects but the
//! provider left out get empty defaults; ad-level metadata is layered on top.

use chrono::{DateTime, NaiveDate};
use serde_json::{json, Map, Value};

use crate::types::creative::MediaType;
use crate::types::document::{ProcessedCreative, SearchDocument};

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Normalize a scraped date to `YYYY-MM-DDTHH:MM:SS`.
///
/// Accepts RFC 3339 and the day-first/ISO shapes the ad library emits.
/// Returns `None` for anything else.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn styles_default() -> Value {
    json!({"font_style": "", "color": "", "formatting": [], "position": ""})
}

fn tone_default() -> Value {
    json!({"tone": "", "writing_style": "", "visual_style": ""})
}

fn focus_default() -> Value {
    json!({"main_element": "", "focus_area": "", "visual_hierarchy": ""})
}

/// Fields every document of `media_type` carries, with their empty values.
fn default_fields(media_type: MediaType) -> Vec<(&'static str, Value)> {
    let mut fields = vec![
        ("title", json!("")),
        ("hook", json!("")),
        ("theme", json!("")),
        ("keywords", json!([])),
        ("product_categories", json!([])),
        ("product_features", json!([])),
        ("tone_and_style", tone_default()),
        ("visual_focus", focus_default()),
    ];

    match media_type {
        MediaType::Image => fields.extend([
            ("H1", json!("")),
            ("H1_styles", styles_default()),
            ("H2", json!("")),
            ("H3", json!("")),
            ("Objective", json!("")),
            ("Subjects", json!([])),
            ("Colour_schema", json!([])),
            ("Emotional_appeal", json!([])),
            ("brand_colors", json!([])),
            ("usps", json!("")),
            ("conversion_elements", json!({})),
            ("audience_targeting", json!({})),
        ]),
        MediaType::Video => fields.extend([
            ("advertisement_type", json!("")),
            ("motto", json!("")),
            ("summary", json!("")),
            ("target_audience", json!("")),
            ("call_to_action", json!("")),
            ("h1_styles", styles_default()),
            ("unique_selling_proposition", json!("")),
            ("main_topic", json!("")),
            ("objective", json!("")),
            (
                "description",
                json!({"subjects": [], "colour_schema": [], "emotional_appeal": []}),
            ),
            ("narrative_analysis", json!({})),
            ("user_journey", json!({})),
            ("conversion_path", json!({})),
            ("key_moments", json!([])),
        ]),
    }

    fields
}

fn text_or_empty(value: &Option<String>) -> Value {
    json!(value.as_deref().unwrap_or(""))
}

/// Build the search document for a processed creative.
pub fn search_document(item: &ProcessedCreative) -> SearchDocument {
    let creative = &item.creative;
    let ad = &creative.ad;

    let mut body: Map<String, Value> = item.record.fields().clone();
    for (key, default) in default_fields(creative.media_type) {
        body.entry(key).or_insert(default);
    }

    let ad_fields = [
        ("url", json!(creative.url)),
        ("ad_id", json!(ad.ad_id)),
        ("media_type", json!(creative.media_type)),
        ("hash", json!(item.hash)),
        ("page_id", json!(ad.page_id)),
        ("status", json!(ad.status)),
        ("cta_button", text_or_empty(&ad.cta_button)),
        (
            "start_date",
            json!(ad.start_date.as_deref().and_then(normalize_date)),
        ),
        (
            "end_date",
            json!(ad.end_date.as_deref().and_then(normalize_date)),
        ),
        ("active_duration", json!(ad.active_duration)),
        ("ad_text", text_or_empty(&ad.ad_text)),
        ("ad_link", text_or_empty(&ad.ad_link)),
        ("ad_cta", text_or_empty(&ad.ad_cta)),
        ("timestamp", json!(ad.timestamp)),
        ("platforms", json!(ad.platforms)),
        ("advertiser", text_or_empty(&ad.advertiser)),
        ("ad_description", text_or_empty(&ad.description)),
        (
            "variation_count",
            ad.variation_count.clone().unwrap_or_else(|| json!(0)),
        ),
        ("carousel_position", json!(creative.carousel_position)),
        ("reused_analysis", json!(item.reused_analysis)),
        ("created_at", json!(item.processed_at)),
    ];
    for (key, value) in ad_fields {
        body.insert(key.to_string(), value);
    }

    SearchDocument {
        id: creative.document_id(),
        body: Value::Object(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::creative::{AdMetadata, ContentHash, Creative};
    use crate::types::record::ExtractedRecord;
    use std::sync::Arc;

    fn processed(media_type: MediaType, record: Value, ad: AdMetadata) -> ProcessedCreative {
        let creative = Creative::new("https://cdn.example.com/x", media_type, Arc::new(ad));
        ProcessedCreative::new(
            creative,
            ContentHash::of_bytes(b"x"),
            ExtractedRecord::from_value(record).unwrap(),
            false,
        )
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("05 Mar 2024").as_deref(), Some("2024-03-05T00:00:00"));
        assert_eq!(normalize_date("2024-03-05").as_deref(), Some("2024-03-05T00:00:00"));
        assert_eq!(normalize_date("05/03/2024").as_deref(), Some("2024-03-05T00:00:00"));
        assert_eq!(
            normalize_date("2024-03-05T10:20:30Z").as_deref(),
            Some("2024-03-05T10:20:30")
        );
        assert_eq!(normalize_date("March 5th"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn test_video_defaults_fill_missing_fields() {
        let item = processed(
            MediaType::Video,
            json!({"hook": "Wait for it", "extra_field": 42}),
            AdMetadata {
                ad_id: "ad-1".into(),
                page_id: "p-1".into(),
                description: Some("Ad copy".into()),
                start_date: Some("01 Jan 2024".into()),
                ..Default::default()
            },
        );

        let doc = search_document(&item);
        assert_eq!(doc.body["hook"], "Wait for it");
        assert_eq!(doc.body["extra_field"], 42);
        assert_eq!(doc.body["summary"], "");
        assert_eq!(doc.body["key_moments"], json!([]));
        assert_eq!(doc.body["description"]["subjects"], json!([]));
        assert_eq!(doc.body["ad_description"], "Ad copy");
        assert_eq!(doc.body["start_date"], "2024-01-01T00:00:00");
        assert_eq!(doc.body["end_date"], Value::Null);
        assert_eq!(doc.body["variation_count"], 0);
        assert_eq!(doc.id, item.creative.document_id());
    }

    #[test]
    fn test_image_defaults_and_ad_fields_override() {
        let item = processed(
            MediaType::Image,
            json!({"title": "Sale", "url": "model-invented"}),
            AdMetadata {
                ad_id: "ad-2".into(),
                page_id: "p-2".into(),
                platforms: vec!["instagram".into()],
                ..Default::default()
            },
        );

        let doc = search_document(&item);
        assert_eq!(doc.body["title"], "Sale");
        assert_eq!(doc.body["H1_styles"]["formatting"], json!([]));
        assert_eq!(doc.body["url"], "https://cdn.example.com/x");
        assert_eq!(doc.body["media_type"], "image");
        assert_eq!(doc.body["platforms"], json!(["instagram"]));
        assert_eq!(doc.body["cta_button"], "");
    }
}
