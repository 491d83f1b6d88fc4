//! Field catalog: which fields exist on which types, and their shapes
//!
//! The mutation engine never guesses shapes; it asks a [`FieldCatalog`].
//! [`SchemaTable`] is the default catalog, seeded from a built-in table of
//! FHIR R4 core definitions and extended with StructureDefinitions from an
//! implementation guide folder.

mod builtin;
pub mod structure_definition;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

pub use crate::model::{Cardinality, FieldKind};
pub use structure_definition::StructureDefinition;

/// Types whose values are shifted by date operations
pub const TEMPORAL_TYPES: &[&str] = &["date", "dateTime", "instant", "time", "Period"];

/// Resolved shape of one concrete field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub cardinality: Cardinality,
    pub kind: FieldKind,
    /// Primitive type code, datatype name, or block element path
    pub type_name: String,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Every primitive may carry `id` and `extension` sub-slots
    pub fn is_extension_capable(&self) -> bool {
        self.kind.is_primitive()
    }
}

/// Schema lookup used by the document model and the mutation engine
pub trait FieldCatalog {
    /// Describe `name` on the schema owner `owner` (a type name or block path).
    ///
    /// Choice fields are addressed by their concrete name, e.g. `valueString`.
    fn field(&self, owner: &str, name: &str) -> Option<FieldDescriptor>;

    /// Paths (relative to the resource, `[x]` marking choices) whose type is temporal
    fn temporal_fields(&self, resource_type: &str) -> Vec<String>;

    fn is_resource_type(&self, name: &str) -> bool;
}

#[derive(Debug, Clone)]
struct ElementDef {
    types: Vec<String>,
    repeated: bool,
    choice: bool,
    block: Option<String>,
}

impl ElementDef {
    fn descriptor(&self, type_code: &str) -> FieldDescriptor {
        let cardinality = if self.repeated {
            Cardinality::Repeated
        } else {
            Cardinality::Single
        };
        match &self.block {
            Some(block) => FieldDescriptor {
                cardinality,
                kind: FieldKind::Block,
                type_name: block.clone(),
            },
            None => FieldDescriptor {
                cardinality,
                kind: kind_for_type(type_code),
                type_name: type_code.to_string(),
            },
        }
    }
}

/// Table-driven field catalog
#[derive(Debug, Clone, Default)]
pub struct SchemaTable {
    owners: HashMap<String, IndexMap<String, ElementDef>>,
    resources: HashSet<String>,
}

impl SchemaTable {
    /// An empty table (only useful for tests and custom catalogs)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table seeded with the built-in FHIR R4 core subset
    pub fn r4_core() -> Self {
        let mut table = Self::default();
        builtin::load_into(&mut table);
        table
    }

    pub fn register_resource(&mut self, name: &str) {
        self.resources.insert(name.to_string());
    }

    /// Add or replace one element definition.
    ///
    /// `path` is a full element path such as `Patient.contact.name` or
    /// `Observation.value[x]`. Blocks (BackboneElement/Element typed paths or
    /// content references) are keyed by their own path.
    pub fn add_element(
        &mut self,
        path: &str,
        types: &[String],
        repeated: bool,
        content_reference: Option<&str>,
    ) {
        let Some((owner, name)) = path.rsplit_once('.') else {
            return;
        };
        let (name, choice) = match name.strip_suffix("[x]") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let block = match content_reference {
            Some(reference) => Some(
                reference
                    .rsplit_once('#')
                    .map(|(_, target)| target)
                    .unwrap_or(reference)
                    .to_string(),
            ),
            None if !choice
                && types.len() == 1
                && matches!(types[0].as_str(), "BackboneElement" | "Element") =>
            {
                Some(path.to_string())
            }
            None => None,
        };
        if types.is_empty() && block.is_none() {
            return;
        }

        self.owners.entry(owner.to_string()).or_default().insert(
            name.to_string(),
            ElementDef {
                types: types.to_vec(),
                repeated,
                choice,
                block,
            },
        );
    }

    /// Copy every field of `from` onto `to` (for datatype profiles like `Age`)
    pub fn alias_type(&mut self, to: &str, from: &str) {
        if let Some(fields) = self.owners.get(from).cloned() {
            self.owners.insert(to.to_string(), fields);
        }
    }

    /// Load a StructureDefinition; returns the number of elements registered
    pub fn add_structure_definition(&mut self, definition: &StructureDefinition) -> usize {
        structure_definition::register(self, definition)
    }

    pub fn knows_owner(&self, owner: &str) -> bool {
        self.owners.contains_key(owner)
    }

    fn lookup_chain<'a>(&self, owner: &'a str) -> Vec<&'a str> {
        let mut chain = vec![owner];
        if self.resources.contains(owner) {
            chain.extend(["DomainResource", "Resource"]);
        } else if owner.contains('.') {
            chain.push("BackboneElement");
        }
        if owner != "Element" {
            chain.push("Element");
        }
        chain
    }

    fn field_in(&self, owner: &str, name: &str) -> Option<FieldDescriptor> {
        let defs = self.owners.get(owner)?;
        if let Some(def) = defs.get(name)
            && !def.choice
        {
            return def.types.first().map(|t| def.descriptor(t)).or_else(|| {
                def.block.as_ref().map(|_| def.descriptor("BackboneElement"))
            });
        }

        defs.iter()
            .filter(|(base, def)| def.choice && name.len() > base.len() && name.starts_with(*base))
            .find_map(|(base, def)| {
                let suffix = &name[base.len()..];
                def.types
                    .iter()
                    .find(|t| upper_first(t) == suffix)
                    .map(|t| def.descriptor(t))
            })
    }

    fn collect_temporal(&self, owner: &str, prefix: &str, out: &mut Vec<String>, depth: usize) {
        let Some(defs) = self.owners.get(owner) else {
            return;
        };
        for (name, def) in defs {
            let label = if def.choice {
                format!("{prefix}{name}[x]")
            } else {
                format!("{prefix}{name}")
            };
            if def.block.is_none() && def.types.iter().any(|t| is_temporal_type(t)) {
                out.push(label.clone());
            }
            if let Some(block) = &def.block
                && depth < 8
            {
                self.collect_temporal(block, &format!("{label}."), out, depth + 1);
            }
        }
    }
}

impl FieldCatalog for SchemaTable {
    fn field(&self, owner: &str, name: &str) -> Option<FieldDescriptor> {
        self.lookup_chain(owner)
            .into_iter()
            .find_map(|key| self.field_in(key, name))
    }

    fn temporal_fields(&self, resource_type: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_temporal(resource_type, "", &mut out, 0);
        out
    }

    fn is_resource_type(&self, name: &str) -> bool {
        self.resources.contains(name)
    }
}

pub fn is_temporal_type(type_code: &str) -> bool {
    TEMPORAL_TYPES.contains(&type_code)
}

/// Primitive codes start lowercase; `Reference` gets its own kind
pub fn kind_for_type(type_code: &str) -> FieldKind {
    if type_code.starts_with(|c: char| c.is_ascii_lowercase()) {
        FieldKind::Primitive
    } else if type_code == "Reference" {
        FieldKind::Reference
    } else {
        FieldKind::Composite
    }
}

/// `dateTime` -> `DateTime`, the suffix form used by choice fields
pub fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
