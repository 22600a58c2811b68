//! OpenAPI 3.0 shaped rendering of observed operations.
//!
//! One observed pair becomes a single-path `Paths` fragment:
//! `{"<normalized-path>": {"<method>": {parameters, requestBody, responses}}}`.
//! Rendering goes through `serde_json::Value`, whose object maps keep keys
//! sorted, so the serialized fragment is canonical and digests are stable.

use serde_json::{json, Map, Value};
use siege_core::endpoint::{NormalizedPath, ParamKind};

use crate::schema::{Schema, UnionSchema, ValueSchema};

/// Everything needed to describe one observed operation.
#[derive(Debug)]
pub struct OperationParts<'a> {
    pub method: &'a str,
    pub status: u16,
    pub path: &'a NormalizedPath,
    pub request_header_names: &'a [String],
    pub response_header_names: &'a [String],
    pub request_schema: Option<&'a Schema>,
    pub response_schema: Option<&'a Schema>,
}

/// Render a single-path, single-method `Paths` fragment.
pub fn paths_fragment(parts: &OperationParts<'_>) -> Value {
    let mut methods = Map::new();
    methods.insert(
        parts.method.to_ascii_lowercase(),
        operation_value(parts),
    );
    let mut paths = Map::new();
    paths.insert(parts.path.path.clone(), Value::Object(methods));
    Value::Object(paths)
}

/// Render the operation object for one observed pair.
pub fn operation_value(parts: &OperationParts<'_>) -> Value {
    let mut operation = Map::new();

    let mut parameters: Vec<Value> = parts
        .request_header_names
        .iter()
        .map(|name| json!({ "name": name, "in": "header" }))
        .collect();
    for param in &parts.path.params {
        let schema = match param.kind {
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Uuid => json!({ "type": "string", "format": "uuid" }),
        };
        parameters.push(json!({
            "name": param.name,
            "in": "path",
            "required": true,
            "schema": schema,
        }));
    }
    if !parameters.is_empty() {
        operation.insert("parameters".to_string(), Value::Array(parameters));
    }

    if let Some(schema) = parts.request_schema {
        operation.insert(
            "requestBody".to_string(),
            json!({
                "content": { "application/json": { "schema": schema_value(schema) } },
            }),
        );
    }

    let mut response = Map::new();
    response.insert("description".to_string(), Value::String(String::new()));
    if let Some(schema) = parts.response_schema {
        response.insert(
            "content".to_string(),
            json!({ "application/json": { "schema": schema_value(schema) } }),
        );
        if !parts.response_header_names.is_empty() {
            let headers: Map<String, Value> = parts
                .response_header_names
                .iter()
                .map(|name| (name.clone(), json!({})))
                .collect();
            response.insert("headers".to_string(), Value::Object(headers));
        }
    }
    let mut responses = Map::new();
    responses.insert(parts.status.to_string(), Value::Object(response));
    operation.insert("responses".to_string(), Value::Object(responses));

    Value::Object(operation)
}

/// Render a structural schema as an OpenAPI schema object.
pub fn schema_value(schema: &Schema) -> Value {
    match schema {
        Schema::Object(object) => {
            let mut out = Map::new();
            out.insert("type".to_string(), json!("object"));
            if !object.fields().is_empty() {
                let properties: Map<String, Value> = object
                    .fields()
                    .iter()
                    .map(|f| (f.key.clone(), schema_value(&f.value)))
                    .collect();
                out.insert("properties".to_string(), Value::Object(properties));
            }
            let required: Vec<Value> = object
                .fields()
                .iter()
                .filter(|f| f.required)
                .map(|f| Value::String(f.key.clone()))
                .collect();
            if !required.is_empty() {
                out.insert("required".to_string(), Value::Array(required));
            }
            Value::Object(out)
        }
        Schema::Array(array) => match &array.element {
            Some(element) => json!({ "type": "array", "items": schema_value(element) }),
            None => json!({ "type": "array" }),
        },
        Schema::Value(value) => value_schema_value(value),
        Schema::Union(union) => union_schema_value(union),
    }
}

fn value_schema_value(value: &ValueSchema) -> Value {
    let mut types = Vec::new();
    if value.maybe_string {
        types.push("string");
    }
    if value.maybe_number {
        types.push("number");
    }
    if value.maybe_bool {
        types.push("boolean");
    }

    let mut out = Map::new();
    match types.as_slice() {
        [] => {}
        [single] => {
            out.insert("type".to_string(), json!(single));
        }
        many => {
            let variants: Vec<Value> = many.iter().map(|t| json!({ "type": t })).collect();
            out.insert("oneOf".to_string(), Value::Array(variants));
        }
    }
    if value.maybe_null {
        out.insert("nullable".to_string(), Value::Bool(true));
    }
    Value::Object(out)
}

fn union_schema_value(union: &UnionSchema) -> Value {
    let mut variants = Vec::new();
    if let Some(object) = &union.object {
        variants.push(schema_value(&Schema::Object(object.clone())));
    }
    if let Some(array) = &union.array {
        variants.push(schema_value(&Schema::Array(array.clone())));
    }
    if let Some(value) = &union.value {
        variants.push(value_schema_value(value));
    }
    json!({ "oneOf": variants })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::infer_bytes;
    use siege_core::endpoint::normalize_path;

    #[test]
    fn test_primitive_rendering() {
        let schema = infer_bytes(br#"{"ok": true}"#).unwrap();
        let value = schema_value(&schema);
        assert_eq!(
            value,
            json!({
                "type": "object",
                "properties": { "ok": { "type": "boolean" } },
                "required": ["ok"],
            })
        );
    }

    #[test]
    fn test_nullable_single_type() {
        let schema = infer_bytes(br#"["x", null]"#).unwrap();
        let value = schema_value(&schema);
        assert_eq!(
            value,
            json!({
                "type": "array",
                "items": { "type": "string", "nullable": true },
            })
        );
    }

    #[test]
    fn test_mixed_primitives_use_one_of() {
        let schema = infer_bytes(br#"[1, "x"]"#).unwrap();
        let value = schema_value(&schema);
        assert_eq!(
            value["items"],
            json!({ "oneOf": [{ "type": "string" }, { "type": "number" }] })
        );
    }

    #[test]
    fn test_union_rendering() {
        let schema = infer_bytes(br#"[{"a": 1}, null]"#).unwrap();
        let value = schema_value(&schema);
        assert_eq!(
            value["items"],
            json!({
                "oneOf": [
                    {
                        "type": "object",
                        "properties": { "a": { "type": "number" } },
                        "required": ["a"],
                    },
                    { "nullable": true },
                ],
            })
        );
    }

    #[test]
    fn test_optional_fields_left_out_of_required() {
        let a = infer_bytes(br#"{"always": 1, "sometimes": 2}"#).unwrap();
        let b = infer_bytes(br#"{"always": 3}"#).unwrap();
        let merged = crate::merge::merge_schemas(a, b);
        let value = schema_value(&merged);
        assert_eq!(value["required"], json!(["always"]));
    }

    #[test]
    fn test_paths_fragment_shape() {
        let path = normalize_path("/users/42");
        let schema = infer_bytes(br#"{"id": "1"}"#).unwrap();
        let parts = OperationParts {
            method: "POST",
            status: 201,
            path: &path,
            request_header_names: &["Content-Type".to_string()],
            response_header_names: &[],
            request_schema: None,
            response_schema: Some(&schema),
        };
        let fragment = paths_fragment(&parts);

        let op = &fragment["/users/{arg1}"]["post"];
        assert_eq!(op["parameters"][0], json!({ "name": "Content-Type", "in": "header" }));
        assert_eq!(op["parameters"][1]["in"], "path");
        assert_eq!(op["parameters"][1]["schema"]["type"], "integer");
        assert_eq!(op["responses"]["201"]["description"], "");
        assert!(op["responses"]["201"]["content"]["application/json"]["schema"].is_object());
        assert!(op.get("requestBody").is_none());
    }

    #[test]
    fn test_serialization_is_canonical() {
        // Two fragments built from identically shaped input serialize to the
        // same bytes regardless of construction order.
        let a = schema_value(&infer_bytes(br#"{"b": 1, "a": "x"}"#).unwrap());
        let b = schema_value(&infer_bytes(br#"{"a": "y", "b": 2}"#).unwrap());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
