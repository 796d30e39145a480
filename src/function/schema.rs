//! Flattened type schemas for function inputs and outputs.
//!
//! Workflow tooling consumes a flat map from a dot-path to a type string
//! rather than a nested JSON schema: array segments get a `[]` suffix
//! (nested arrays append another `[]`), map segments get `[map]` with the
//! value spelled `map[K]V`, and option wrappers collapse to their pointee.
//! The encoding matches the other workers in the fleet so the workflow
//! server can treat function catalogs uniformly.

use std::collections::BTreeMap;

use schemars::gen::SchemaSettings;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;

/// Derives the flattened schema for a type.
pub fn type_schema<T: JsonSchema>() -> BTreeMap<String, String> {
    let generator = SchemaSettings::default()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator();
    let root = generator.into_root_schema_for::<T>();

    let mut result = BTreeMap::new();
    build_schema(&root.schema, "", &mut result);
    result
}

/// Derives the flattened schema for a type as a JSON string.
pub fn type_schema_json<T: JsonSchema>() -> String {
    serde_json::to_string(&type_schema::<T>()).unwrap_or_else(|_| "{}".to_string())
}

/// Walks a struct-like schema, emitting one entry per leaf field.
fn build_schema(obj: &SchemaObject, path: &str, result: &mut BTreeMap<String, String>) {
    if let Some(object) = &obj.object {
        if !object.properties.is_empty() {
            for (name, schema) in &object.properties {
                let field_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}.{name}")
                };
                if let Some(field) = schema_object(schema) {
                    process_field(field, &field_path, result);
                }
            }
            return;
        }
    }

    // Non-struct roots record their own type.
    let key = if path.is_empty() { "type" } else { path };
    result.insert(key.to_string(), leaf_type(obj));
}

fn process_field(obj: &SchemaObject, path: &str, result: &mut BTreeMap<String, String>) {
    // Option<T> inlines as `anyOf [T, null]` for complex pointees;
    // collapse to the pointee.
    if let Some(subschemas) = &obj.subschemas {
        if let Some(any_of) = &subschemas.any_of {
            let non_null: Vec<&SchemaObject> = any_of
                .iter()
                .filter_map(schema_object)
                .filter(|schema| !is_null(schema))
                .collect();
            if let [pointee] = non_null.as_slice() {
                process_field(pointee, path, result);
                return;
            }
        }
    }

    if is_struct(obj) {
        build_schema(obj, path, result);
    } else if is_array(obj) {
        process_array_field(obj, path, result);
    } else if let Some(value_type) = map_value_type(obj) {
        result.insert(format!("{path}[map]"), format!("map[string]{value_type}"));
    } else {
        result.insert(path.to_string(), leaf_type(obj));
    }
}

fn process_array_field(obj: &SchemaObject, path: &str, result: &mut BTreeMap<String, String>) {
    let array_path = format!("{path}[]");

    let item = obj
        .array
        .as_ref()
        .and_then(|array| array.items.as_ref())
        .and_then(|items| match items {
            SingleOrVec::Single(schema) => schema_object(schema),
            SingleOrVec::Vec(schemas) => schemas.first().and_then(schema_object),
        });

    match item {
        Some(item) => process_field(item, &array_path, result),
        None => {
            result.insert(array_path, "string".to_string());
        }
    }
}

fn schema_object(schema: &Schema) -> Option<&SchemaObject> {
    match schema {
        Schema::Object(obj) => Some(obj),
        Schema::Bool(_) => None,
    }
}

fn is_struct(obj: &SchemaObject) -> bool {
    obj.object
        .as_ref()
        .map(|object| !object.properties.is_empty())
        .unwrap_or(false)
}

fn is_array(obj: &SchemaObject) -> bool {
    obj.array.is_some() || has_instance(obj, InstanceType::Array)
}

fn map_value_type(obj: &SchemaObject) -> Option<String> {
    let object = obj.object.as_ref()?;
    if !object.properties.is_empty() {
        return None;
    }
    let additional = object.additional_properties.as_ref()?;
    Some(match schema_object(additional) {
        Some(value) => leaf_type(value),
        None => "string".to_string(),
    })
}

fn is_null(obj: &SchemaObject) -> bool {
    matches!(
        &obj.instance_type,
        Some(SingleOrVec::Single(single)) if **single == InstanceType::Null
    )
}

fn has_instance(obj: &SchemaObject, target: InstanceType) -> bool {
    match &obj.instance_type {
        Some(SingleOrVec::Single(single)) => **single == target,
        Some(SingleOrVec::Vec(list)) => list.contains(&target),
        None => false,
    }
}

/// Type name for a leaf schema, ignoring nullability.
fn leaf_type(obj: &SchemaObject) -> String {
    let instance = match &obj.instance_type {
        Some(SingleOrVec::Single(single)) => Some(**single),
        Some(SingleOrVec::Vec(list)) => list
            .iter()
            .copied()
            .find(|instance| *instance != InstanceType::Null),
        None => None,
    };
    match instance {
        Some(InstanceType::String) => "string",
        Some(InstanceType::Integer) => "int",
        Some(InstanceType::Number) => "float64",
        Some(InstanceType::Boolean) => "bool",
        Some(InstanceType::Object) => "object",
        Some(InstanceType::Array) => "array",
        Some(InstanceType::Null) | None => "string",
    }
    .to_string()
}
