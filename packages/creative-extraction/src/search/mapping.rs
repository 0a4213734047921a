//! Index mappings for creative search documents.

use serde_json::{json, Map, Value};

use crate::types::creative::MediaType;

const KEYWORD_FIELDS: &[&str] = &[
    "url",
    "ad_id",
    "media_type",
    "hash",
    "page_id",
    "status",
    "platforms",
    "product_categories",
];

const DATE_FIELDS: &[&str] = &["start_date", "end_date"];

const TEXT_FIELDS: &[&str] = &["title", "hook", "theme", "ad_text", "ad_description", "summary"];

/// Index body (`settings` + `mappings`) created on first use.
///
/// Both media types share the field layout; remaining fields are mapped
/// dynamically.
pub fn index_mapping(media_type: MediaType) -> Value {
    let mut properties = Map::new();
    for field in KEYWORD_FIELDS {
        properties.insert((*field).to_string(), json!({"type": "keyword"}));
    }
    for field in DATE_FIELDS {
        properties.insert(
            (*field).to_string(),
            json!({"type": "date", "format": "strict_date_optional_time||epoch_millis"}),
        );
    }
    for field in TEXT_FIELDS {
        properties.insert((*field).to_string(), json!({"type": "text"}));
    }
    properties.insert("created_at".to_string(), json!({"type": "date"}));

    json!({
        "settings": {"number_of_shards": 1},
        "mappings": {
            "_meta": {"media_type": media_type.as_str()},
            "properties": properties
        }
    })
}
