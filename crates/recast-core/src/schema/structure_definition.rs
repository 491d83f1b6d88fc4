//! StructureDefinition subset used to extend the schema table

use serde::Deserialize;

use super::SchemaTable;

const FHIRPATH_SYSTEM_PREFIX: &str = "http://hl7.org/fhirpath/System.";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    pub url: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub derivation: Option<String>,
    pub snapshot: Option<ElementList>,
    pub differential: Option<ElementList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementList {
    #[serde(default)]
    pub element: Vec<ElementDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    pub path: String,
    pub slice_name: Option<String>,
    pub max: Option<String>,
    #[serde(default, rename = "type")]
    pub types: Vec<TypeRef>,
    pub content_reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeRef {
    pub code: String,
}

impl StructureDefinition {
    /// Profiles constrain existing types; they never add new field shapes
    pub fn is_constraint(&self) -> bool {
        self.derivation.as_deref() == Some("constraint")
    }

    fn elements(&self) -> &[ElementDefinition] {
        self.snapshot
            .as_ref()
            .filter(|list| !list.element.is_empty())
            .or(self.differential.as_ref())
            .map(|list| list.element.as_slice())
            .unwrap_or(&[])
    }
}

impl ElementDefinition {
    fn is_repeated(&self) -> bool {
        match self.max.as_deref() {
            Some("*") => true,
            Some(max) => max.parse::<u32>().map(|n| n > 1).unwrap_or(false),
            None => false,
        }
    }

    fn type_codes(&self) -> Vec<String> {
        self.types
            .iter()
            .map(|t| match t.code.strip_prefix(FHIRPATH_SYSTEM_PREFIX) {
                Some(system) => system.to_ascii_lowercase(),
                None => t.code.clone(),
            })
            .collect()
    }
}

pub(super) fn register(table: &mut SchemaTable, definition: &StructureDefinition) -> usize {
    if definition.is_constraint() {
        return 0;
    }
    let Some(type_name) = definition.type_name.as_deref() else {
        return 0;
    };
    if definition.kind.as_deref() == Some("resource") {
        table.register_resource(type_name);
    }

    let mut added = 0;
    for element in definition.elements() {
        if element.slice_name.is_some() || !element.path.contains('.') {
            continue;
        }
        table.add_element(
            &element.path,
            &element.type_codes(),
            element.is_repeated(),
            element.content_reference.as_deref(),
        );
        added += 1;
    }
    tracing::debug!(
        "Registered {} elements from StructureDefinition {}",
        added,
        definition.url.as_deref().unwrap_or(type_name)
    );
    added
}
