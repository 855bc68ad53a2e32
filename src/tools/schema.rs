//! Translation of tool-server schemas into function declarations.
//!
//! The tool server reports each tool with its own JSON Schema flavour.
//! The chat-completion API expects `{name, description, parameters}` where
//! `parameters` is an object schema. Translation never fails: a tool
//! without a schema gets an empty object schema, and a default value that
//! does not parse is simply left out.

use serde_json::{json, Map, Value};

use crate::types::{FunctionDeclaration, PropertySchema, ToolDescriptor, ToolSchema};

/// Convert one tool descriptor into a function declaration.
pub fn translate(descriptor: &ToolDescriptor) -> FunctionDeclaration {
    FunctionDeclaration {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        parameters: translate_parameters(descriptor.input_schema.as_ref()),
    }
}

/// Convert an (optional) input schema into a function parameter schema.
pub fn translate_parameters(schema: Option<&ToolSchema>) -> Value {
    let Some(schema) = schema else {
        return json!({ "type": "object", "properties": {} });
    };

    let properties: Map<String, Value> = schema
        .properties
        .iter()
        .map(|(name, property)| (name.clone(), translate_property(property)))
        .collect();

    let mut result = Map::new();
    result.insert(
        "type".to_string(),
        Value::String(schema.schema_type.clone().unwrap_or_else(|| "object".to_string())),
    );
    result.insert("properties".to_string(), Value::Object(properties));
    if !schema.required.is_empty() {
        result.insert("required".to_string(), json!(schema.required));
    }

    Value::Object(result)
}

fn translate_property(property: &PropertySchema) -> Value {
    let mut result = Map::new();
    result.insert(
        "type".to_string(),
        Value::String(property.schema_type.clone().unwrap_or_else(|| "string".to_string())),
    );

    if let Some(description) = property.description.as_deref().filter(|d| !d.is_empty()) {
        result.insert("description".to_string(), Value::String(description.to_string()));
    }

    if let Some(default) = property.default.as_deref().and_then(parse_default) {
        result.insert("default".to_string(), default);
    }

    if !property.enum_values.is_empty() {
        result.insert("enum".to_string(), Value::Array(property.enum_values.clone()));
    }

    if let Some(items) = &property.items {
        result.insert("items".to_string(), translate_property(items));
    }

    Value::Object(result)
}

fn parse_default(raw: &str) -> Option<Value> {
    serde_json::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn summary_descriptor() -> ToolDescriptor {
        let mut properties = BTreeMap::new();
        properties.insert(
            "duration".to_string(),
            PropertySchema {
                schema_type: Some("integer".to_string()),
                description: Some("Window in seconds".to_string()),
                default: Some("60".to_string()),
                ..Default::default()
            },
        );
        properties.insert(
            "command".to_string(),
            PropertySchema {
                schema_type: Some("string".to_string()),
                description: Some(String::new()),
                default: Some("not json".to_string()),
                ..Default::default()
            },
        );

        ToolDescriptor {
            name: "get_network_summary".to_string(),
            description: "Aggregated connection statistics".to_string(),
            input_schema: Some(ToolSchema {
                schema_type: Some("object".to_string()),
                properties,
                required: vec!["duration".to_string()],
            }),
        }
    }

    #[test]
    fn test_translate_full_schema() {
        let declaration = translate(&summary_descriptor());
        assert_eq!(declaration.name, "get_network_summary");
        assert_eq!(declaration.description, "Aggregated connection statistics");
        assert_eq!(
            declaration.parameters,
            json!({
                "type": "object",
                "properties": {
                    "duration": {
                        "type": "integer",
                        "description": "Window in seconds",
                        "default": 60
                    },
                    "command": { "type": "string" }
                },
                "required": ["duration"]
            })
        );
    }

    #[test]
    fn test_missing_schema_yields_empty_object() {
        let descriptor = ToolDescriptor {
            name: "analyze_patterns".to_string(),
            description: String::new(),
            input_schema: None,
        };
        assert_eq!(
            translate(&descriptor).parameters,
            json!({ "type": "object", "properties": {} })
        );
    }

    #[test]
    fn test_required_omitted_when_empty() {
        let parameters = translate_parameters(Some(&ToolSchema::default()));
        assert_eq!(parameters, json!({ "type": "object", "properties": {} }));
        assert!(parameters.get("required").is_none());
    }

    #[test]
    fn test_translation_is_idempotent() {
        let descriptor = summary_descriptor();
        assert_eq!(translate(&descriptor), translate(&descriptor));
    }

    #[test]
    fn test_array_items_and_enum_are_carried() {
        let property = PropertySchema {
            schema_type: Some("array".to_string()),
            items: Some(Box::new(PropertySchema {
                enum_values: vec![json!("tcp"), json!("udp")],
                ..Default::default()
            })),
            ..Default::default()
        };
        assert_eq!(
            translate_property(&property),
            json!({
                "type": "array",
                "items": { "type": "string", "enum": ["tcp", "udp"] }
            })
        );
    }
}
