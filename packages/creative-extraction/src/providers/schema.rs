//! Structured-output schema requested from the video provider.

use serde_json::{json, Value};

fn string() -> Value {
    json!({"type": "STRING"})
}

fn strings() -> Value {
    json!({"type": "ARRAY", "items": {"type": "STRING"}})
}

fn object(properties: Value) -> Value {
    json!({"type": "OBJECT", "properties": properties})
}

/// Default `responseSchema` for video analysis.
pub fn video_response_schema() -> Value {
    object(json!({
        "hook": string(),
        "advertisement_type": string(),
        "motto": string(),
        "title": string(),
        "keywords": {
            "type": "ARRAY",
            "items": object(json!({"keyword": string(), "weight": {"type": "NUMBER"}}))
        },
        "theme": string(),
        "key_moments": {
            "type": "ARRAY",
            "items": object(json!({"timestamp": string(), "description": string()}))
        },
        "summary": string(),
        "target_audience": string(),
        "call_to_action": string(),
        "tone_and_style": object(json!({
            "tone": string(), "writing_style": string(), "visual_style": string()
        })),
        "visual_focus": object(json!({
            "main_element": string(), "focus_area": string(), "visual_hierarchy": string()
        })),
        "h1_styles": object(json!({
            "font_style": string(), "color": string(), "formatting": strings(), "position": string()
        })),
        "unique_selling_proposition": string(),
        "main_topic": string(),
        "objective": string(),
        "description": object(json!({
            "subjects": strings(), "colour_schema": strings(), "emotional_appeal": strings()
        })),
        "narrative_analysis": object(json!({
            "story_flow": strings(), "message_progression": strings(), "key_moments": strings()
        })),
        "user_journey": object(json!({
            "problem_framing": string(),
            "solution_presentation": string(),
            "benefit_demonstration": strings()
        })),
        "conversion_path": object(json!({"cta_timing": strings()})),
        "product_categories": strings(),
        "product_features": strings(),
        "messaging_angle": object(json!({
            "primary_approach": string(),
            "message_framing": string(),
            "messaging_tactics": strings(),
            "notable_aspects": string()
        }))
    }))
}
