//! Typed document model
//!
//! Documents are trees of [`Element`]s whose named [`FieldSlot`]s hold
//! ordered [`Node`]s. Slot shapes (single vs. repeated, primitive vs.
//! composite vs. block vs. reference) come from the schema catalog.

mod bundle;
mod document;
pub mod json;
mod node;

pub use bundle::{Bundle, BundleEntry};
pub use document::{Document, URN_UUID_PREFIX};
pub use node::{Cardinality, Element, FieldKind, FieldSlot, Node, Primitive, scalar_text};
