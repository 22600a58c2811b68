//! Schema inference from parsed JSON values.
//!
//! Inference is pure: one sample in, one precise schema out. Widening across
//! samples happens in [`crate::merge`].

use serde_json::Value;

use crate::merge::merge;
use crate::schema::{ArraySchema, FieldSchema, ObjectSchema, Schema, ValueSchema};

/// Infer the schema of a single JSON value.
pub fn infer(value: &Value) -> Schema {
    match value {
        Value::Object(map) => Schema::Object(ObjectSchema::new(
            map.iter()
                .map(|(key, v)| FieldSchema {
                    key: key.clone(),
                    value: infer(v),
                    required: true,
                })
                .collect(),
        )),
        Value::Array(items) => {
            let element = items
                .iter()
                .fold(None, |acc, item| merge(acc, Some(infer(item))));
            Schema::Array(ArraySchema {
                element: element.map(Box::new),
            })
        }
        Value::String(_) => Schema::Value(ValueSchema::string()),
        Value::Number(_) => Schema::Value(ValueSchema::number()),
        Value::Bool(_) => Schema::Value(ValueSchema::boolean()),
        Value::Null => Schema::Value(ValueSchema::null()),
    }
}

/// Parse `bytes` as JSON and infer its schema.
pub fn infer_bytes(bytes: &[u8]) -> Result<Schema, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    Ok(infer(&value))
}
