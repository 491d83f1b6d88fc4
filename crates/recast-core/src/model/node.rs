//! Tree nodes: elements, primitives and the slots that hold them

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Whether a field holds at most one node or an ordered list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Repeated,
}

/// Shape of the nodes a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Scalar value (string, boolean, number) that may carry extensions
    Primitive,
    /// Reusable complex datatype such as `HumanName` or `Coding`
    Composite,
    /// Anonymous nested block defined inline by its owner (BackboneElement)
    Block,
    /// A `Reference` datatype
    Reference,
}

impl FieldKind {
    pub fn is_primitive(self) -> bool {
        matches!(self, FieldKind::Primitive)
    }
}

/// A named field of an element with its ordered nodes
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    pub cardinality: Cardinality,
    pub kind: FieldKind,
    pub nodes: Vec<Node>,
}

impl FieldSlot {
    pub fn new(cardinality: Cardinality, kind: FieldKind) -> Self {
        Self {
            cardinality,
            kind,
            nodes: Vec::new(),
        }
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Scalar values of primitive nodes, in order
    pub fn primitive_values(&self) -> impl Iterator<Item = &JsonValue> {
        self.nodes
            .iter()
            .filter_map(|node| node.as_primitive().and_then(|p| p.value.as_ref()))
    }
}

/// One node in a document tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Primitive(Primitive),
    Element(Element),
}

impl Node {
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Node::Primitive(primitive) => Some(primitive),
            Node::Element(_) => None,
        }
    }

    pub fn as_primitive_mut(&mut self) -> Option<&mut Primitive> {
        match self {
            Node::Primitive(primitive) => Some(primitive),
            Node::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Primitive(_) => None,
        }
    }

    /// The element that holds this node's child slots.
    ///
    /// For primitives this is the companion element carrying `id` and `extension`.
    pub fn children(&self) -> &Element {
        match self {
            Node::Primitive(primitive) => &primitive.element,
            Node::Element(element) => element,
        }
    }

    pub fn children_mut(&mut self) -> &mut Element {
        match self {
            Node::Primitive(primitive) => &mut primitive.element,
            Node::Element(element) => element,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            Node::Primitive(primitive) => primitive.type_name.as_deref(),
            Node::Element(element) => element.type_name.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Primitive(primitive) => primitive.is_empty(),
            Node::Element(element) => element.is_empty(),
        }
    }
}

/// A scalar value with optional type code and extension sub-slots
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Primitive {
    pub value: Option<JsonValue>,
    pub type_name: Option<String>,
    pub element: Element,
}

impl Primitive {
    pub fn new(value: Option<JsonValue>, type_name: Option<String>) -> Self {
        Self {
            value,
            type_name,
            element: Element::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.element.is_empty()
    }

    /// Text form of the scalar, used for predicate comparisons
    pub fn value_text(&self) -> Option<String> {
        self.value.as_ref().map(scalar_text)
    }
}

/// A complex node: an ordered map of named field slots
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Schema owner key: a datatype, a resource type, or a block element path
    pub type_name: Option<String>,
    pub fields: IndexMap<String, FieldSlot>,
}

impl Element {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            fields: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|slot| slot.nodes.iter().all(Node::is_empty))
    }

    pub fn slot(&self, name: &str) -> Option<&FieldSlot> {
        self.fields.get(name)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut FieldSlot> {
        self.fields.get_mut(name)
    }

    /// Return the named slot, inserting an empty one with the given shape if missing
    pub fn slot_or_insert(
        &mut self,
        name: &str,
        cardinality: Cardinality,
        kind: FieldKind,
    ) -> &mut FieldSlot {
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| FieldSlot::new(cardinality, kind))
    }

    /// First scalar of a primitive field
    pub fn primitive_value(&self, name: &str) -> Option<&JsonValue> {
        self.slot(name).and_then(|slot| slot.primitive_values().next())
    }

    pub fn primitive_text(&self, name: &str) -> Option<String> {
        self.primitive_value(name).map(scalar_text)
    }

    /// Replace a single-valued primitive field
    pub fn set_primitive(&mut self, name: &str, value: JsonValue, type_name: Option<&str>) {
        let slot = self.slot_or_insert(name, Cardinality::Single, FieldKind::Primitive);
        slot.nodes = vec![Node::Primitive(Primitive::new(
            Some(value),
            type_name.map(str::to_string),
        ))];
    }

    /// Append to a repeated primitive field unless the value is already present
    pub fn push_primitive_unique(&mut self, name: &str, value: JsonValue, type_name: Option<&str>) {
        let slot = self.slot_or_insert(name, Cardinality::Repeated, FieldKind::Primitive);
        if slot.primitive_values().any(|existing| *existing == value) {
            return;
        }
        slot.nodes.push(Node::Primitive(Primitive::new(
            Some(value),
            type_name.map(str::to_string),
        )));
    }

    pub fn child_element(&self, name: &str) -> Option<&Element> {
        self.slot(name)
            .and_then(|slot| slot.nodes.first())
            .and_then(Node::as_element)
    }
}

/// Render a JSON scalar as plain text (strings without quotes)
pub fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
