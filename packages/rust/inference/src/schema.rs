//! JSON schema generation for structured model output.
//!
//! Chat-completion providers that enforce `response_format: json_schema` in
//! strict mode require `additionalProperties: false` on every object, every
//! property listed in `required` (nullable ones included), and no `$ref`s.

use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A type the model can be asked to produce.
///
/// Implemented for every `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Strict-mode JSON schema for this type.
    fn strict_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        require_all_properties(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    /// Name sent alongside the schema.
    fn output_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn require_all_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".into(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let keys = props.keys().cloned().map(Value::String).collect();
                    map.insert("required".into(), Value::Array(keys));
                }
            }
            for v in map.values_mut() {
                require_all_properties(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(require_all_properties),
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = value.get("definitions").cloned();
    if let Some(defs) = definitions {
        inline_refs_with(value, &defs);
    }
}

fn inline_refs_with(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(def) = target {
                *value = def;
                inline_refs_with(value, definitions);
                return;
            }

            // schemars wraps referenced fields with docs in a single-element allOf.
            if let Some(Value::Array(all_of)) = map.get("allOf") {
                if let [only] = all_of.as_slice() {
                    *value = only.clone();
                    inline_refs_with(value, definitions);
                    return;
                }
            }

            for v in map.values_mut() {
                inline_refs_with(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_with(item, definitions);
            }
        }
        _ => {}
    }
}
