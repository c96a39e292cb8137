//! Audit payload construction.
//!
//! Audit entries carry a before/after diff of only the changed fields. The
//! diff is computed over the top-level JSON rendering of an entity, which is
//! flat enough here that field-level granularity is exactly what operations
//! people read.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};

/// Diff two JSON objects field by field.
///
/// Returns `{ field: { "from": .., "to": .. } }` for every top-level field
/// whose value differs. Non-object inputs fall back to a whole-value diff.
pub fn changed_fields(before: &JsonValue, after: &JsonValue) -> JsonValue {
    let (JsonValue::Object(before), JsonValue::Object(after)) = (before, after) else {
        return json!({ "value": { "from": before, "to": after } });
    };

    let mut diff = Map::new();
    for (key, before_value) in before {
        let after_value = after.get(key).unwrap_or(&JsonValue::Null);
        if before_value != after_value {
            diff.insert(
                key.clone(),
                json!({ "from": before_value, "to": after_value }),
            );
        }
    }
    for (key, after_value) in after {
        if !before.contains_key(key) {
            diff.insert(key.clone(), json!({ "from": null, "to": after_value }));
        }
    }
    JsonValue::Object(diff)
}

/// Diff two serializable entities (or their absence, for create/delete).
pub fn entity_diff<T: Serialize>(before: Option<&T>, after: Option<&T>) -> JsonValue {
    let before = before
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(JsonValue::Object(Map::new()));
    let after = after
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(JsonValue::Object(Map::new()));
    changed_fields(&before, &after)
}
