//! Bundles: ordered collections of documents transformed as a unit

use serde_json::{Map, Value as JsonValue, json};

use super::document::{Document, URN_UUID_PREFIX};
use super::node::{Cardinality, Element, FieldKind, FieldSlot, Node};
use crate::error::RecastError;
use crate::result::Result;
use crate::schema::FieldCatalog;

/// One bundle entry
#[derive(Debug, Clone, PartialEq)]
pub struct BundleEntry {
    pub full_url: Option<String>,
    pub resource: Document,
    pub request: Option<JsonValue>,
    /// Entry keys other than `fullUrl`, `resource` and `request` (kept verbatim)
    pub extra: Map<String, JsonValue>,
}

impl BundleEntry {
    pub fn new(resource: Document) -> Self {
        Self {
            full_url: None,
            resource,
            request: None,
            extra: Map::new(),
        }
    }

    fn to_json(&self) -> JsonValue {
        let mut out = Map::new();
        if let Some(full_url) = &self.full_url {
            out.insert("fullUrl".to_string(), json!(full_url));
        }
        out.insert("resource".to_string(), self.resource.to_json());
        if let Some(request) = &self.request {
            out.insert("request".to_string(), request.clone());
        }
        out.extend(self.extra.clone());
        JsonValue::Object(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// Top-level keys other than `entry`, in their original order
    fields: Map<String, JsonValue>,
    pub entries: Vec<BundleEntry>,
}

impl Bundle {
    pub fn new(bundle_type: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("resourceType".to_string(), json!("Bundle"));
        fields.insert("type".to_string(), json!(bundle_type));
        Self {
            fields,
            entries: Vec::new(),
        }
    }

    pub fn from_json(value: &JsonValue, catalog: &dyn FieldCatalog) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RecastError::invalid_document("bundle is not a JSON object"))?;
        if object.get("resourceType").and_then(JsonValue::as_str) != Some("Bundle") {
            return Err(RecastError::invalid_document(
                "expected a resource of type Bundle",
            ));
        }

        let mut fields = Map::new();
        let mut entries = Vec::new();
        for (key, value) in object {
            if key != "entry" {
                fields.insert(key.clone(), value.clone());
                continue;
            }
            for item in value.as_array().map(Vec::as_slice).unwrap_or_default() {
                match read_entry(item, catalog)? {
                    Some(entry) => entries.push(entry),
                    None => tracing::warn!("Skipping bundle entry without a resource"),
                }
            }
        }

        Ok(Self { fields, entries })
    }

    pub fn to_json(&self) -> JsonValue {
        let mut out = self.fields.clone();
        out.insert(
            "entry".to_string(),
            JsonValue::Array(self.entries.iter().map(BundleEntry::to_json).collect()),
        );
        JsonValue::Object(out)
    }

    pub fn bundle_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(JsonValue::as_str)
    }

    pub fn is_transaction(&self) -> bool {
        self.bundle_type() == Some("transaction")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|entry| &entry.resource)
    }

    pub fn document(&self, index: usize) -> Option<&Document> {
        self.entries.get(index).map(|entry| &entry.resource)
    }

    pub fn document_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.entries.get_mut(index).map(|entry| &mut entry.resource)
    }

    pub fn position(&self, resource_type: &str, id: &str) -> Option<usize> {
        self.documents().position(|doc| {
            doc.resource_type() == resource_type && doc.id().as_deref() == Some(id)
        })
    }

    /// Append a document with a `urn:uuid:` fullUrl, adding a POST request
    /// when the bundle is a transaction. Returns the new entry index.
    pub fn push_document(&mut self, document: Document) -> usize {
        let mut entry = BundleEntry::new(document);
        entry.full_url = entry
            .resource
            .id()
            .map(|id| format!("{URN_UUID_PREFIX}{id}"));
        if self.is_transaction() {
            entry.request = Some(json!({
                "method": "POST",
                "url": entry.resource.resource_type(),
            }));
        }
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Keep entries whose flag is true; missing flags keep the entry
    pub fn retain_flags(&mut self, keep: &[bool]) {
        let mut index = 0;
        self.entries.retain(|_| {
            let kept = keep.get(index).copied().unwrap_or(true);
            index += 1;
            kept
        });
    }

    /// Element view of the whole bundle, for `Bundle`-rooted path expressions
    pub fn to_element(&self) -> Element {
        let mut root = Element::new("Bundle");
        for (key, value) in &self.fields {
            if !(value.is_object() || value.is_array() || value.is_null()) {
                root.set_primitive(key, value.clone(), None);
            }
        }

        let mut entries = FieldSlot::new(Cardinality::Repeated, FieldKind::Block);
        for entry in &self.entries {
            let mut element = Element::new("Bundle.entry");
            if let Some(full_url) = &entry.full_url {
                element.set_primitive("fullUrl", json!(full_url), Some("uri"));
            }
            let mut resource = FieldSlot::new(Cardinality::Single, FieldKind::Composite);
            resource
                .nodes
                .push(Node::Element(entry.resource.root().clone()));
            element.fields.insert("resource".to_string(), resource);
            entries.nodes.push(Node::Element(element));
        }
        root.fields.insert("entry".to_string(), entries);
        root
    }
}

fn read_entry(item: &JsonValue, catalog: &dyn FieldCatalog) -> Result<Option<BundleEntry>> {
    let Some(object) = item.as_object() else {
        return Err(RecastError::invalid_document(
            "bundle entry is not a JSON object",
        ));
    };
    let Some(resource) = object.get("resource") else {
        return Ok(None);
    };

    let mut document = Document::from_json(resource, catalog)?;
    if let Some(id) = document.id()
        && let Some(stripped) = id.strip_prefix(URN_UUID_PREFIX)
    {
        let stripped = stripped.to_string();
        document.set_id(&stripped);
    }

    let mut entry = BundleEntry::new(document);
    for (key, value) in object {
        match key.as_str() {
            "resource" => {}
            "fullUrl" => entry.full_url = value.as_str().map(str::to_string),
            "request" => entry.request = Some(value.clone()),
            _ => {
                entry.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(Some(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaTable;

    fn sample() -> JsonValue {
        json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:p1",
                    "resource": {"resourceType": "Patient", "id": "urn:uuid:p1", "gender": "female"},
                    "request": {"method": "POST", "url": "Patient"}
                },
                {
                    "fullUrl": "urn:uuid:e1",
                    "resource": {"resourceType": "Encounter", "id": "e1", "status": "finished"}
                }
            ]
        })
    }

    #[test]
    fn test_urn_prefix_is_stripped_from_ids() {
        let schema = SchemaTable::r4_core();
        let bundle = Bundle::from_json(&sample(), &schema).unwrap();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.document(0).unwrap().id().as_deref(), Some("p1"));
        assert_eq!(
            bundle.document(0).unwrap().reference().as_deref(),
            Some("Patient/p1")
        );
        assert_eq!(bundle.position("Encounter", "e1"), Some(1));
    }

    #[test]
    fn test_push_document_in_transaction() {
        let schema = SchemaTable::r4_core();
        let mut bundle = Bundle::from_json(&sample(), &schema).unwrap();

        let mut request = Document::new("ServiceRequest");
        request.set_id("sr-1");
        let index = bundle.push_document(request);

        let json = bundle.to_json();
        assert_eq!(json["entry"][index]["fullUrl"], json!("urn:uuid:sr-1"));
        assert_eq!(
            json["entry"][index]["request"],
            json!({"method": "POST", "url": "ServiceRequest"})
        );
    }

    #[test]
    fn test_push_document_in_collection_has_no_request() {
        let mut bundle = Bundle::new("collection");
        let mut patient = Document::new("Patient");
        patient.set_id("x");
        bundle.push_document(patient);

        assert!(bundle.entries[0].request.is_none());
    }

    #[test]
    fn test_retain_flags() {
        let schema = SchemaTable::r4_core();
        let mut bundle = Bundle::from_json(&sample(), &schema).unwrap();
        bundle.retain_flags(&[false, true]);

        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.document(0).unwrap().resource_type(), "Encounter");
    }

    #[test]
    fn test_to_json_keeps_bundle_fields() {
        let schema = SchemaTable::r4_core();
        let bundle = Bundle::from_json(&sample(), &schema).unwrap();
        let json = bundle.to_json();

        assert_eq!(json["type"], json!("transaction"));
        assert_eq!(json["entry"][0]["resource"]["id"], json!("p1"));
        assert_eq!(json["entry"][1]["resource"]["status"], json!("finished"));
    }
}
