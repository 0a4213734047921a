//! Default prompt: brand context plus output rules.

use serde_json::Value;

use crate::traits::extraction::PromptBuilder;
use crate::types::brand::BrandProfile;
use crate::types::creative::Creative;

/// Prompt that frames the creative with the brand's name and, when the
/// profile carries them, its product categories.
#[derive(Debug, Clone, Default)]
pub struct BrandContextPrompt;

impl PromptBuilder for BrandContextPrompt {
    fn build(&self, creative: &Creative, brand: &BrandProfile) -> String {
        let categories = brand
            .details
            .get("product_categories")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|joined| !joined.is_empty())
            .unwrap_or_else(|| "Not available".to_string());

        format!(
            "Brand Context:\n\
             - Brand Name: {brand_name}\n\
             - Available Product Categories: {categories}\n\n\
             You are a creative analysis tool performing entity extraction on a {media} creative.\n\
             URL being analyzed: {url}\n\n\
             Only use product categories from the list above. Use plain ASCII text.\n\
             Respond with a single JSON object and nothing else.",
            brand_name = brand.name,
            media = creative.media_type,
            url = creative.url,
        )
    }
}
