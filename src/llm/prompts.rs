//! Prompt and output schema for the qualitative takeoff pass.

use serde_json::{json, Value};

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a construction estimator reviewing excerpts from bid documents (drawings, schedules, legends and specifications).

From the evidence snippets, list every countable item type you can identify (signage, egress signs, doors, fixtures and similar). For each item give its category, a short description, the type code if one is shown, the pages it appears on, the quantity if the documents state or imply one, the unit, the sheet reference and your confidence from 0.0 to 1.0.

Also report:
- discrepancyLog: places where documents disagree on a quantity or type
- missingItems: items referenced but never scheduled or quantified
- reviewFlags: anything an estimator should check by hand

Use only the evidence given. Use "TBD" when a quantity is not stated. Write ranges as "X to Y".

Respond with a single JSON object matching the output schema and nothing else."#;

/// JSON schema the collaborator is asked to follow.
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "required": ["entries"],
        "properties": {
            "entries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["category", "description"],
                    "properties": {
                        "category": {"type": "string"},
                        "description": {"type": "string"},
                        "code": {"type": "string"},
                        "pages": {"type": "array", "items": {"type": "integer"}},
                        "estimatedQty": {"type": ["string", "integer"]},
                        "unit": {"type": "string"},
                        "notes": {"type": "string"},
                        "sheetReference": {"type": "string"},
                        "confidence": {"type": "number"}
                    }
                }
            },
            "discrepancyLog": {"type": "array", "items": {"type": "string"}},
            "missingItems": {"type": "array", "items": {"type": "string"}},
            "reviewFlags": {"type": "array", "items": {"type": "string"}},
            "notes": {"type": "string"}
        }
    })
}
