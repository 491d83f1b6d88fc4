//! Path mutation engine
//!
//! Builds or updates a document from a list of path assignments. Each path
//! is walked segment by segment over a stack of [`GenerationTier`]s:
//!
//! - a field name descends into the matching slot of every node in the
//!   current tier, creating a node where none exists;
//! - a `where(field = 'x')` predicate narrows the tier to matching nodes,
//!   labelling an unlabelled node or creating a sibling when nothing matches;
//! - `where(field != 'x')` keeps non-matching and unlabelled nodes.
//!
//! Paths are applied equality predicates first, then not-equals predicates,
//! then plain paths, so that sibling identities exist before anything else
//! writes into them.

mod tier;
pub mod values;

use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use crate::error::RecastError;
use crate::model::{Cardinality, Document, Element, FieldKind, FieldSlot, Node, Primitive};
use crate::model::scalar_text;
use crate::path::{PathEngine, PathExpression, PredicateOp, Segment};
use crate::result::Result;
use crate::schema::{FieldCatalog, FieldDescriptor};

pub use tier::{GenerationTier, NodeAddr, Step, child_addr, element_at, element_at_mut};
pub use values::{
    AssignValue, Assignment, DirectiveSource, MappingEntry, ValueSpec, expand_entries,
};

/// Applies path assignments to documents
pub struct PathGenerator<'a> {
    catalog: &'a dyn FieldCatalog,
    engine: &'a dyn PathEngine,
}

impl<'a> PathGenerator<'a> {
    pub fn new(catalog: &'a dyn FieldCatalog, engine: &'a dyn PathEngine) -> Self {
        Self { catalog, engine }
    }

    /// Build a new document of `resource_type`
    pub fn generate(&self, resource_type: &str, assignments: &[Assignment]) -> Result<Document> {
        self.apply(None, resource_type, assignments)
    }

    /// Mutate an existing document in place
    pub fn update(&self, document: &mut Document, assignments: &[Assignment]) -> Result<()> {
        let resource_type = document.resource_type().to_string();
        let ordered = self.ordered(assignments)?;
        for (path, assignment) in ordered {
            self.apply_path(document.root_mut(), &resource_type, &path, &assignment.value);
        }
        Ok(())
    }

    /// Update `document`, or generate a new `resource_type` document when absent
    pub fn apply(
        &self,
        document: Option<Document>,
        resource_type: &str,
        assignments: &[Assignment],
    ) -> Result<Document> {
        let mut document = document.unwrap_or_else(|| Document::new(resource_type));
        self.update(&mut document, assignments)?;
        Ok(document)
    }

    /// Parse every location and sort stably by path class
    fn ordered<'v>(
        &self,
        assignments: &'v [Assignment],
    ) -> Result<Vec<(PathExpression, &'v Assignment)>> {
        let mut parsed = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            match self.engine.parse(&assignment.location) {
                Ok(path) => parsed.push((path, assignment)),
                Err(err) if err.is_unsupported() => {
                    warn!("Skipping '{}': {}", assignment.location, err);
                }
                Err(err) => return Err(RecastError::path_error(&assignment.location, err)),
            }
        }
        parsed.sort_by_key(|(path, _)| path.class());
        Ok(parsed)
    }

    fn apply_path(
        &self,
        root: &mut Element,
        resource_type: &str,
        path: &PathExpression,
        value: &AssignValue,
    ) {
        trace!("Applying {} to {}", path, resource_type);
        let mut segments = path.segments.as_slice();

        if let Some(Segment::Name { field, index: None }) = segments.first()
            && field.starts_with(|c: char| c.is_ascii_uppercase())
        {
            if field != resource_type {
                warn!(
                    "Path '{}' targets {} but the document is a {}; skipping",
                    path, field, resource_type
                );
                return;
            }
            segments = &segments[1..];
        }

        let mut tiers = vec![GenerationTier::root(resource_type)];
        for (position, segment) in segments.iter().enumerate() {
            let is_last = position + 1 == segments.len();
            let keep_going = match segment {
                Segment::Name { field, index } => {
                    self.handle_name(root, &mut tiers, field, *index, is_last, value)
                }
                Segment::Predicate { field, op, literal } => {
                    self.handle_predicate(root, &mut tiers, field, op, literal)
                }
                Segment::Unsupported(text) => {
                    warn!("Ignoring unsupported segment '{}' in '{}'", text, path);
                    true
                }
            };
            if !keep_going {
                debug!("Path '{}' stopped at segment {}", path, position);
                return;
            }
        }
    }

    fn handle_name(
        &self,
        root: &mut Element,
        tiers: &mut Vec<GenerationTier>,
        field: &str,
        index: Option<usize>,
        is_last: bool,
        value: &AssignValue,
    ) -> bool {
        let Some(parent) = tiers.last() else {
            return false;
        };
        let Some(descriptor) = self.catalog.field(&parent.owner, field) else {
            warn!("Unknown field '{}' on {}; skipping path", field, parent.owner);
            return false;
        };
        if index.is_some_and(|i| i > 0) && !descriptor.is_repeated() {
            warn!("Index on single-valued field '{}'; skipping path", field);
            return false;
        }

        let nodes = if descriptor.kind.is_primitive() {
            self.handle_primitive(root, &parent.nodes, field, index, &descriptor, is_last, value)
        } else {
            self.handle_composite(root, &parent.nodes, field, index, &descriptor, is_last, value)
        };
        match nodes {
            Some(nodes) => {
                tiers.push(GenerationTier::child(field, descriptor, nodes));
                true
            }
            None => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_primitive(
        &self,
        root: &mut Element,
        parents: &[NodeAddr],
        field: &str,
        index: Option<usize>,
        descriptor: &FieldDescriptor,
        is_last: bool,
        value: &AssignValue,
    ) -> Option<Vec<NodeAddr>> {
        let scalar = match value {
            AssignValue::Scalar(scalar) => Some(coerce_scalar(scalar, &descriptor.type_name)),
            AssignValue::Element(_) if is_last => {
                warn!("Cannot assign a composite value to primitive field '{}'", field);
                return None;
            }
            AssignValue::Element(_) => None,
        };

        let mut next = Vec::with_capacity(parents.len());
        for parent in parents {
            let Some(element) = element_at_mut(root, parent) else {
                continue;
            };
            let slot = element.slot_or_insert(field, descriptor.cardinality, FieldKind::Primitive);
            let position = place_primitive(slot, index, scalar.as_ref(), &descriptor.type_name, is_last);
            next.push(child_addr(parent, field, position));
        }
        Some(next)
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_composite(
        &self,
        root: &mut Element,
        parents: &[NodeAddr],
        field: &str,
        index: Option<usize>,
        descriptor: &FieldDescriptor,
        is_last: bool,
        value: &AssignValue,
    ) -> Option<Vec<NodeAddr>> {
        if is_last && let AssignValue::Scalar(scalar) = value {
            warn!(
                "Cannot assign scalar {} to {} field '{}'; skipping",
                scalar, descriptor.type_name, field
            );
            return None;
        }

        let mut next = Vec::new();
        for parent in parents {
            let Some(element) = element_at_mut(root, parent) else {
                continue;
            };
            let slot = element.slot_or_insert(field, descriptor.cardinality, descriptor.kind);

            if is_last && let AssignValue::Element(assigned) = value {
                let mut assigned = assigned.clone();
                assigned.type_name = Some(descriptor.type_name.clone());
                assign_element(slot, index, assigned);
                continue;
            }

            match index {
                Some(index) => {
                    pad_elements(slot, index + 1, &descriptor.type_name);
                    next.push(child_addr(parent, field, index));
                }
                None => {
                    if slot.nodes.is_empty() {
                        slot.nodes
                            .push(Node::Element(Element::new(descriptor.type_name.as_str())));
                    }
                    next.extend((0..slot.nodes.len()).map(|i| child_addr(parent, field, i)));
                }
            }
        }
        Some(next)
    }

    fn handle_predicate(
        &self,
        root: &mut Element,
        tiers: &mut [GenerationTier],
        field: &str,
        op: &PredicateOp,
        literal: &str,
    ) -> bool {
        let Some(tier) = tiers.last() else {
            return false;
        };
        let descriptor = match self.catalog.field(&tier.owner, field) {
            Some(descriptor) if descriptor.kind.is_primitive() => descriptor,
            _ => {
                warn!(
                    "Predicate field '{}' on {} is not a primitive; skipping path",
                    field, tier.owner
                );
                return false;
            }
        };
        if let PredicateOp::Unsupported(symbol) = op {
            warn!("Unsupported predicate operator '{}'; skipping path", symbol);
            return false;
        }

        let mut matching = Vec::new();
        let mut unlabeled = Vec::new();
        for addr in &tier.nodes {
            let values: Vec<String> = element_at(root, addr)
                .and_then(|element| element.slot(field))
                .map(|slot| slot.primitive_values().map(scalar_text).collect())
                .unwrap_or_default();
            if values.is_empty() {
                unlabeled.push(addr.clone());
                continue;
            }
            let matched = match op {
                PredicateOp::Equals => values.iter().any(|v| v == literal),
                _ => values.iter().any(|v| v != literal),
            };
            if matched {
                matching.push(addr.clone());
            }
        }

        if matching.is_empty() {
            match op {
                PredicateOp::Equals => {
                    let labelled = match unlabeled.into_iter().next() {
                        Some(addr) => Some(addr),
                        None => self.create_sibling(root, tiers),
                    };
                    let Some(addr) = labelled else {
                        return false;
                    };
                    if let Some(element) = element_at_mut(root, &addr) {
                        let value = coerce_scalar(&JsonValue::from(literal), &descriptor.type_name);
                        set_label(element, field, value, &descriptor);
                    }
                    matching.push(addr);
                }
                _ => {
                    if unlabeled.is_empty() {
                        warn!(
                            "No candidate for where({} != '{}') on '{}'; skipping path",
                            field, literal, tier.field
                        );
                        return false;
                    }
                    matching = unlabeled;
                }
            }
        }

        if let Some(tier) = tiers.last_mut() {
            tier.nodes = matching;
        }
        true
    }

    /// Append a new node to the tier's slot under the first parent node
    fn create_sibling(&self, root: &mut Element, tiers: &[GenerationTier]) -> Option<NodeAddr> {
        let [.., parent, tier] = tiers else {
            warn!("Cannot create a sibling of the document root");
            return None;
        };
        let parent_addr = parent.nodes.first()?;
        let descriptor = tier.descriptor.as_ref()?;
        if descriptor.kind.is_primitive() || !descriptor.is_repeated() {
            warn!(
                "Cannot add a second '{}' to single-valued or primitive slot",
                tier.field
            );
            return None;
        }
        let slot = element_at_mut(root, parent_addr)?.slot_mut(&tier.field)?;
        slot.nodes
            .push(Node::Element(Element::new(descriptor.type_name.as_str())));
        trace!("Created sibling {}[{}]", tier.field, slot.nodes.len() - 1);
        Some(child_addr(parent_addr, &tier.field, slot.nodes.len() - 1))
    }
}

/// Put a primitive into `slot` and return its position
fn place_primitive(
    slot: &mut FieldSlot,
    index: Option<usize>,
    scalar: Option<&JsonValue>,
    type_name: &str,
    is_last: bool,
) -> usize {
    let new_node = || Node::Primitive(Primitive::new(scalar.cloned(), Some(type_name.to_string())));

    if let Some(index) = index {
        while slot.nodes.len() <= index {
            slot.nodes
                .push(Node::Primitive(Primitive::new(None, Some(type_name.to_string()))));
        }
        let has_value = slot.nodes[index]
            .as_primitive()
            .is_some_and(|p| p.value.is_some());
        if (is_last || !has_value)
            && let Some(primitive) = slot.nodes[index].as_primitive_mut()
        {
            primitive.value = scalar.cloned();
        }
        return index;
    }

    // Extension access keeps an existing scalar untouched
    if !is_last && !slot.nodes.is_empty() {
        return 0;
    }

    if slot.is_repeated() {
        if let Some(existing) = slot.nodes.iter().position(|node| {
            node.as_primitive()
                .is_some_and(|p| p.value.as_ref() == scalar)
        }) {
            return existing;
        }
        slot.nodes.push(new_node());
        return slot.nodes.len() - 1;
    }

    match slot.nodes.first_mut().and_then(Node::as_primitive_mut) {
        Some(primitive) => primitive.value = scalar.cloned(),
        None => slot.nodes = vec![new_node()],
    }
    0
}

fn assign_element(slot: &mut FieldSlot, index: Option<usize>, element: Element) {
    let type_name = element.type_name.clone().unwrap_or_default();
    match index {
        Some(index) => {
            pad_elements(slot, index + 1, &type_name);
            slot.nodes[index] = Node::Element(element);
        }
        None if slot.is_repeated() => {
            let node = Node::Element(element);
            if !slot.nodes.contains(&node) {
                slot.nodes.push(node);
            }
        }
        None => slot.nodes = vec![Node::Element(element)],
    }
}

fn pad_elements(slot: &mut FieldSlot, len: usize, type_name: &str) {
    while slot.nodes.len() < len {
        slot.nodes.push(Node::Element(Element::new(type_name)));
    }
}

fn set_label(element: &mut Element, field: &str, value: JsonValue, descriptor: &FieldDescriptor) {
    match descriptor.cardinality {
        Cardinality::Repeated => {
            element.push_primitive_unique(field, value, Some(&descriptor.type_name))
        }
        Cardinality::Single => element.set_primitive(field, value, Some(&descriptor.type_name)),
    }
}

/// Convert a mapping scalar to the JSON shape of a primitive type
pub fn coerce_scalar(value: &JsonValue, type_code: &str) -> JsonValue {
    let text = scalar_text(value);
    match type_code {
        "boolean" => match text.trim() {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            _ => JsonValue::String(text),
        },
        "integer" | "positiveInt" | "unsignedInt" | "integer64" => text
            .trim()
            .parse::<i64>()
            .map(JsonValue::from)
            .unwrap_or(JsonValue::String(text)),
        "decimal" => match value {
            JsonValue::Number(_) => value.clone(),
            _ => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::String(text)),
        },
        _ => JsonValue::String(text),
    }
}
