//! Conversion between FHIR JSON and the typed node tree
//!
//! Field shapes come from the [`FieldCatalog`] when it knows the field and
//! are otherwise inferred from the JSON, so unknown content round-trips.
//! Primitive extensions follow the FHIR JSON convention of a `_field`
//! companion, with `null` placeholders keeping repeated values aligned.

use serde_json::{Map, Value as JsonValue};

use super::node::{Cardinality, Element, FieldKind, FieldSlot, Node, Primitive};
use crate::schema::{FieldCatalog, FieldDescriptor};

/// Owner key used for the `id`/`extension` companions of primitives
const PRIMITIVE_OWNER: &str = "Element";

pub fn read_element(
    object: &Map<String, JsonValue>,
    owner: &str,
    catalog: &dyn FieldCatalog,
) -> Element {
    let mut element = Element::new(owner);

    for (key, value) in object {
        if let Some(base) = key.strip_prefix('_') {
            if object.contains_key(base) {
                continue;
            }
            // Primitive carrying only extensions, no value
            let descriptor = catalog.field(owner, base);
            let placeholder = match value {
                JsonValue::Array(items) => JsonValue::Array(vec![JsonValue::Null; items.len()]),
                _ => JsonValue::Null,
            };
            let slot = read_primitive_slot(&placeholder, Some(value), descriptor.as_ref(), catalog);
            element.fields.insert(base.to_string(), slot);
            continue;
        }

        let descriptor = catalog.field(owner, key);
        let companion = object.get(&format!("_{key}"));
        let is_primitive = match &descriptor {
            Some(descriptor) => descriptor.kind.is_primitive(),
            None => !looks_composite(value),
        };

        let slot = if is_primitive {
            read_primitive_slot(value, companion, descriptor.as_ref(), catalog)
        } else {
            read_composite_slot(key, value, descriptor.as_ref(), owner, catalog)
        };
        element.fields.insert(key.clone(), slot);
    }

    element
}

fn looks_composite(value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(_) => true,
        JsonValue::Array(items) => items.iter().any(JsonValue::is_object),
        _ => false,
    }
}

fn cardinality_for(value: &JsonValue, descriptor: Option<&FieldDescriptor>) -> Cardinality {
    if value.is_array() {
        Cardinality::Repeated
    } else {
        descriptor
            .map(|d| d.cardinality)
            .unwrap_or(Cardinality::Single)
    }
}

fn as_items(value: &JsonValue) -> Vec<&JsonValue> {
    match value {
        JsonValue::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn read_primitive_slot(
    value: &JsonValue,
    companion: Option<&JsonValue>,
    descriptor: Option<&FieldDescriptor>,
    catalog: &dyn FieldCatalog,
) -> FieldSlot {
    let mut slot = FieldSlot::new(cardinality_for(value, descriptor), FieldKind::Primitive);
    let companions = companion.map(as_items).unwrap_or_default();

    for (index, item) in as_items(value).into_iter().enumerate() {
        let type_name = descriptor
            .map(|d| d.type_name.clone())
            .or_else(|| infer_primitive_type(item));
        let mut primitive = Primitive::new(
            (!item.is_null()).then(|| item.clone()),
            type_name,
        );
        if let Some(JsonValue::Object(extra)) = companions.get(index) {
            primitive.element = read_element(extra, PRIMITIVE_OWNER, catalog);
        }
        slot.nodes.push(Node::Primitive(primitive));
    }
    slot
}

fn read_composite_slot(
    name: &str,
    value: &JsonValue,
    descriptor: Option<&FieldDescriptor>,
    owner: &str,
    catalog: &dyn FieldCatalog,
) -> FieldSlot {
    let kind = descriptor.map(|d| d.kind).unwrap_or(FieldKind::Composite);
    let mut slot = FieldSlot::new(cardinality_for(value, descriptor), kind);

    for item in as_items(value) {
        let node = match item {
            JsonValue::Object(object) => {
                let child_owner = match object.get("resourceType").and_then(JsonValue::as_str) {
                    Some(resource_type) => resource_type.to_string(),
                    None => descriptor
                        .map(|d| d.type_name.clone())
                        .unwrap_or_else(|| format!("{owner}.{name}")),
                };
                Node::Element(read_element(object, &child_owner, catalog))
            }
            other => Node::Primitive(Primitive::new(
                (!other.is_null()).then(|| other.clone()),
                infer_primitive_type(other),
            )),
        };
        slot.nodes.push(node);
    }
    slot
}

fn infer_primitive_type(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Bool(_) => Some("boolean".to_string()),
        JsonValue::Number(number) if number.is_i64() || number.is_u64() => {
            Some("integer".to_string())
        }
        JsonValue::Number(_) => Some("decimal".to_string()),
        _ => None,
    }
}

pub fn write_element(element: &Element) -> Map<String, JsonValue> {
    let mut out = Map::new();
    for (name, slot) in &element.fields {
        if slot.kind.is_primitive() {
            write_primitive_slot(name, slot, &mut out);
        } else {
            write_composite_slot(name, slot, &mut out);
        }
    }
    out
}

fn write_primitive_slot(name: &str, slot: &FieldSlot, out: &mut Map<String, JsonValue>) {
    let mut values = Vec::with_capacity(slot.nodes.len());
    let mut companions = Vec::with_capacity(slot.nodes.len());

    for node in &slot.nodes {
        match node {
            Node::Primitive(primitive) => {
                values.push(primitive.value.clone().unwrap_or(JsonValue::Null));
                let extra = write_element(&primitive.element);
                companions.push(if extra.is_empty() {
                    JsonValue::Null
                } else {
                    JsonValue::Object(extra)
                });
            }
            Node::Element(element) => {
                values.push(JsonValue::Object(write_element(element)));
                companions.push(JsonValue::Null);
            }
        }
    }

    let has_values = values.iter().any(|v| !v.is_null());
    let has_companions = companions.iter().any(|c| !c.is_null());

    if slot.is_repeated() {
        if has_values {
            out.insert(name.to_string(), JsonValue::Array(values));
        }
        if has_companions {
            out.insert(format!("_{name}"), JsonValue::Array(companions));
        }
    } else {
        if let Some(value) = values.into_iter().find(|v| !v.is_null()) {
            out.insert(name.to_string(), value);
        }
        if let Some(companion) = companions.into_iter().find(|c| !c.is_null()) {
            out.insert(format!("_{name}"), companion);
        }
    }
}

fn write_composite_slot(name: &str, slot: &FieldSlot, out: &mut Map<String, JsonValue>) {
    let mut items: Vec<JsonValue> = slot
        .nodes
        .iter()
        .filter(|node| !node.is_empty())
        .map(|node| match node {
            Node::Element(element) => JsonValue::Object(write_element(element)),
            Node::Primitive(primitive) => primitive.value.clone().unwrap_or(JsonValue::Null),
        })
        .collect();

    if items.is_empty() {
        return;
    }
    if slot.is_repeated() {
        out.insert(name.to_string(), JsonValue::Array(items));
    } else {
        out.insert(name.to_string(), items.swap_remove(0));
    }
}
