//! Brand context handed to extraction prompts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const UNKNOWN_BRAND: &str = "Unknown Brand";

/// Brand details for the page being analysed. Opaque to the pipeline apart
/// from the name, which prompts interpolate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandProfile {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl BrandProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            details: Map::new(),
        }
    }

    /// Derive a profile from the brand's website.
    ///
    /// `https://www.acme-outdoor.com` becomes "Acme Outdoor".
    pub fn from_url(brand_url: Option<&str>) -> Self {
        let name = brand_url
            .and_then(brand_name_from_url)
            .unwrap_or_else(|| UNKNOWN_BRAND.to_string());

        Self {
            name,
            url: brand_url.map(str::to_string),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

fn brand_name_from_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = url::Url::parse(raw)
        .or_else(|_| url::Url::parse(&format!("https://{raw}")))
        .ok()?;
    let host = parsed.host_str()?;

    let label = host
        .split('.')
        .find(|label| !label.is_empty() && !label.eq_ignore_ascii_case("www"))?;

    let name = label
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");

    (!name.is_empty()).then_some(name)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
