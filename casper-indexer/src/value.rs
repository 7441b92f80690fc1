//! Display conversion for parsed CLValues and other loosely typed JSON.
//!
//! Every JSON variant has a defined string form. Numbers keep the exact text
//! the node sent, so a U512 that arrives as a number is never rounded through f64.

use serde_json::{Map, Value as JsonValue};

/// Render a value as the string stored in metadata and event columns
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => display_tree(value).to_string(),
    }
}

/// Same shape as the input, with every leaf replaced by its display string
pub fn display_tree(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(display_tree).collect()),
        JsonValue::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), display_tree(v));
            }
            JsonValue::Object(out)
        }
        leaf => JsonValue::String(display_value(leaf)),
    }
}
