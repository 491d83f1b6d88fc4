//! Generation tiers and node addressing
//!
//! Tiers hold addresses rather than references so the walk can mutate the
//! tree between steps.

use crate::model::Element;
use crate::schema::FieldDescriptor;

/// One hop from an element into the `index`-th node of one of its slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub field: String,
    pub index: usize,
}

/// Position of a node relative to the document root; empty is the root itself
pub type NodeAddr = Vec<Step>;

pub fn child_addr(parent: &[Step], field: &str, index: usize) -> NodeAddr {
    let mut addr = parent.to_vec();
    addr.push(Step {
        field: field.to_string(),
        index,
    });
    addr
}

/// The child-holding element of the node at `addr`
pub fn element_at<'e>(root: &'e Element, addr: &[Step]) -> Option<&'e Element> {
    let mut current = root;
    for step in addr {
        current = current.slot(&step.field)?.nodes.get(step.index)?.children();
    }
    Some(current)
}

pub fn element_at_mut<'e>(root: &'e mut Element, addr: &[Step]) -> Option<&'e mut Element> {
    let mut current = root;
    for step in addr {
        current = current
            .slot_mut(&step.field)?
            .nodes
            .get_mut(step.index)?
            .children_mut();
    }
    Some(current)
}

/// Frame for one depth of a path walk: the nodes that satisfy the path so far
#[derive(Debug, Clone)]
pub struct GenerationTier {
    /// Slot walked to reach this tier; empty for the root
    pub field: String,
    pub descriptor: Option<FieldDescriptor>,
    /// Schema owner key describing the children of this tier's nodes
    pub owner: String,
    pub nodes: Vec<NodeAddr>,
}

impl GenerationTier {
    pub fn root(resource_type: &str) -> Self {
        Self {
            field: String::new(),
            descriptor: None,
            owner: resource_type.to_string(),
            nodes: vec![Vec::new()],
        }
    }

    pub fn child(field: &str, descriptor: FieldDescriptor, nodes: Vec<NodeAddr>) -> Self {
        Self {
            field: field.to_string(),
            owner: descriptor.type_name.clone(),
            descriptor: Some(descriptor),
            nodes,
        }
    }
}
