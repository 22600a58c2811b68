//! Identifier extraction from response bodies.
//!
//! Walks a JSON body collecting primitive fields whose key or value looks
//! like an identifier. Top-level identifiers are primary; deeper ones are
//! secondary. Everything else lands in `data`.

use serde_json::{Map, Value};
use siege_core::collector::ApiEvent;
use uuid::Uuid;

/// Keys shaped like `id`, `some_id`, `some-id`, or `someID`.
fn key_looks_like_id(key: &str) -> bool {
    if !key.to_ascii_lowercase().ends_with("id") {
        return false;
    }
    let b = key.as_bytes();
    let l = b.len();
    if l <= 2 {
        return true;
    }
    if b[l - 3] == b'-' || b[l - 3] == b'_' {
        return true;
    }
    if b[l - 2] == b'I' && !b[l - 3].is_ascii_uppercase() {
        return true;
    }
    false
}

fn value_looks_like_id(value: &Value) -> bool {
    matches!(value, Value::String(s) if Uuid::try_parse(s).is_ok())
}

fn record(event: &mut ApiEvent, depth: usize, key: &str, value: &Value) {
    if key.is_empty() {
        // Primitive roots have no key to file the value under.
        return;
    }
    if key_looks_like_id(key) || value_looks_like_id(value) {
        if depth <= 1 {
            event.primary_id.insert(key.to_string(), value.clone());
        } else {
            event.ids.insert(key.to_string(), value.clone());
        }
    } else {
        event.data.insert(key.to_string(), value.clone());
    }
}

fn walk(event: &mut ApiEvent, value: &Value, depth: usize, key: &str) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                walk(event, v, depth + 1, k);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(event, item, depth + 1, key);
            }
        }
        other => record(event, depth, key, other),
    }
}

/// Extract an event from a response body, or `None` when the body carries no
/// identifiers worth reporting.
pub fn extract_event(
    body: &Value,
    operation_name: &str,
    api: Map<String, Value>,
    timestamp: i64,
) -> Option<ApiEvent> {
    let mut event = ApiEvent {
        operation_name: operation_name.to_string(),
        timestamp,
        api,
        ..ApiEvent::default()
    };
    walk(&mut event, body, 0, "");

    if event.primary_id.is_empty() && event.ids.is_empty() {
        return None;
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(body: Value) -> Option<ApiEvent> {
        extract_event(&body, "GET /widget", Map::new(), 0)
    }

    #[test]
    fn test_id_shaped_keys() {
        assert!(key_looks_like_id("id"));
        assert!(key_looks_like_id("user_id"));
        assert!(key_looks_like_id("user-id"));
        assert!(key_looks_like_id("userID"));
        assert!(!key_looks_like_id("valid"));
        assert!(!key_looks_like_id("UUID"));
        assert!(!key_looks_like_id("name"));
    }

    #[test]
    fn test_top_level_id_is_primary() {
        let event = extract(json!({"id": 7, "title": "t"})).unwrap();
        assert_eq!(event.primary_id["id"], json!(7));
        assert_eq!(event.data["title"], json!("t"));
        assert!(event.ids.is_empty());
    }

    #[test]
    fn test_nested_id_is_secondary() {
        let event = extract(json!({"id": 1, "owner": {"user_id": 2}})).unwrap();
        assert_eq!(event.primary_id["id"], json!(1));
        assert_eq!(event.ids["user_id"], json!(2));
    }

    #[test]
    fn test_uuid_value_counts_as_id() {
        let event = extract(json!({"ref": "550e8400-e29b-41d4-a716-446655440000"})).unwrap();
        assert!(event.primary_id.contains_key("ref"));
    }

    #[test]
    fn test_no_identifiers_no_event() {
        assert!(extract(json!({"title": "t", "count": 3})).is_none());
        assert!(extract(json!("bare string")).is_none());
    }

    #[test]
    fn test_array_elements_inherit_key() {
        let event = extract(json!({"items": [{"id": 1}, {"id": 2}]})).unwrap();
        // Later elements overwrite earlier ones; the event records presence,
        // not history.
        assert_eq!(event.ids["id"], json!(2));
    }
}
