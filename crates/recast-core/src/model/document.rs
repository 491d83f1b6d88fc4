//! Top-level resource documents

use serde_json::{Map, Value as JsonValue, json};

use super::json::{read_element, write_element};
use super::node::{Cardinality, Element, FieldKind, FieldSlot, Node, Primitive};
use crate::error::RecastError;
use crate::result::Result;
use crate::schema::FieldCatalog;

pub const URN_UUID_PREFIX: &str = "urn:uuid:";

/// One resource in a bundle.
///
/// `resourceType` and `id` are ordinary primitive fields of the root element,
/// so path expressions such as `Patient.id` see them like any other field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new(resource_type: &str) -> Self {
        let mut root = Element::new(resource_type);
        root.set_primitive("resourceType", json!(resource_type), None);
        Self { root }
    }

    pub fn from_json(value: &JsonValue, catalog: &dyn FieldCatalog) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RecastError::invalid_document("resource is not a JSON object"))?;
        let resource_type = object
            .get("resourceType")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| RecastError::invalid_document("resource has no resourceType"))?;

        Ok(Self {
            root: read_element(object, resource_type, catalog),
        })
    }

    pub fn to_json(&self) -> JsonValue {
        let mut fields = write_element(&self.root);
        let mut out = Map::new();
        out.insert(
            "resourceType".to_string(),
            fields
                .shift_remove("resourceType")
                .unwrap_or_else(|| json!(self.resource_type())),
        );
        out.extend(fields);
        JsonValue::Object(out)
    }

    pub fn resource_type(&self) -> &str {
        self.root.type_name.as_deref().unwrap_or_default()
    }

    pub fn id(&self) -> Option<String> {
        self.root.primitive_text("id")
    }

    /// Set the id, keeping it directly after `resourceType` when newly added
    pub fn set_id(&mut self, id: &str) {
        let node = Node::Primitive(Primitive::new(Some(json!(id)), Some("id".to_string())));
        match self.root.slot_mut("id") {
            Some(slot) => slot.nodes = vec![node],
            None => {
                let mut slot = FieldSlot::new(Cardinality::Single, FieldKind::Primitive);
                slot.nodes.push(node);
                let position = self.root.fields.len().min(1);
                self.root.fields.shift_insert(position, "id".to_string(), slot);
            }
        }
    }

    /// Stable reference: verbatim for `urn:uuid:` ids, otherwise `Type/id`
    pub fn reference(&self) -> Option<String> {
        let id = self.id()?;
        if id.starts_with(URN_UUID_PREFIX) {
            Some(id)
        } else {
            Some(format!("{}/{}", self.resource_type(), id))
        }
    }

    /// Human-readable identity for log and error messages
    pub fn identity(&self) -> String {
        self.reference()
            .unwrap_or_else(|| format!("{} (no id)", self.resource_type()))
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn profiles(&self) -> Vec<String> {
        self.root
            .child_element("meta")
            .and_then(|meta| meta.slot("profile"))
            .map(|slot| slot.primitive_values().map(super::node::scalar_text).collect())
            .unwrap_or_default()
    }

    /// Append a profile URL to `meta.profile` unless already present
    pub fn add_profile(&mut self, url: &str) {
        let meta_slot = self
            .root
            .slot_or_insert("meta", Cardinality::Single, FieldKind::Composite);
        if meta_slot.nodes.is_empty() {
            meta_slot.nodes.push(Node::Element(Element::new("Meta")));
        }
        if let Some(meta) = meta_slot.nodes.first_mut() {
            meta.children_mut()
                .push_primitive_unique("profile", json!(url), Some("canonical"));
        }
    }
}
