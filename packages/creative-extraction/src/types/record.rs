//! Structured records produced by extraction providers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;

/// A provider's structured output for one creative.
///
/// Always a non-empty JSON object. The field layout is owned by the provider
/// schema and passes through the pipeline untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord(Map<String, Value>);

impl ExtractedRecord {
    /// Accept a JSON value only if it is a non-empty object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) if !map.is_empty() => Some(Self(map)),
            _ => None,
        }
    }

    /// Parse model text into a record.
    ///
    /// Tries the raw text first, then one cleanup pass that strips a
    /// surrounding markdown code fence. Anything else fails closed.
    pub fn parse(text: &str) -> Result<Self, ProviderError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ProviderError::Empty);
        }

        let value = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => value,
            Err(first) => {
                let cleaned = strip_code_fence(trimmed);
                if cleaned == trimmed {
                    return Err(ProviderError::Malformed(first.to_string()));
                }
                serde_json::from_str::<Value>(cleaned)
                    .map_err(|e| ProviderError::Malformed(e.to_string()))?
            }
        };

        Self::from_value(value)
            .ok_or_else(|| ProviderError::Malformed("expected a non-empty JSON object".into()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_object() {
        let record = ExtractedRecord::parse(r#"{"title": "Summer sale"}"#).unwrap();
        assert_eq!(record.get("title"), Some(&json!("Summer sale")));
    }

    #[test]
    fn test_parse_fenced_object() {
        let text = "```json\n{\"hook\": \"Stop scrolling\"}\n```";
        let record = ExtractedRecord::parse(text).unwrap();
        assert_eq!(record.get("hook"), Some(&json!("Stop scrolling")));

        let bare_fence = "```\n{\"hook\": \"x\"}\n```";
        assert!(ExtractedRecord::parse(bare_fence).is_ok());
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(
            ExtractedRecord::parse("   "),
            Err(ProviderError::Empty)
        ));
        assert!(matches!(
            ExtractedRecord::parse("{}"),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            ExtractedRecord::parse("[1, 2]"),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            ExtractedRecord::parse("Sure! Here is the JSON you asked for"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_value() {
        assert!(ExtractedRecord::from_value(json!({"a": 1})).is_some());
        assert!(ExtractedRecord::from_value(json!({})).is_none());
        assert!(ExtractedRecord::from_value(json!("text")).is_none());
    }
}
