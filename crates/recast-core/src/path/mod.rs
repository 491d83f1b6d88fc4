//! Path expressions: parsing, evaluation and the segment form used for mutation
//!
//! The query engine sits behind [`PathEngine`]. [`FhirPathLite`] is the
//! built-in implementation: a FHIRPath subset covering navigation, indexers,
//! `where`/`select`/`exists`/`ofType` and friends, type tests, comparisons,
//! boolean logic, membership and unions.

pub mod adapter;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod segments;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::model::Element;

pub use adapter::PathEvaluator;
pub use parser::{Expr, parse_expression};
pub use segments::{PathClass, PathExpression, PredicateOp, Segment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("unexpected character '{ch}' at offset {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("unterminated string literal starting at offset {position}")]
    UnterminatedString { position: usize },

    #[error("{message} at offset {position}")]
    Syntax { message: String, position: usize },

    #[error("unsupported function '{name}'")]
    UnsupportedFunction { name: String },

    #[error("unsupported construct {construct}")]
    Unsupported { construct: String },
}

impl PathError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Constructs outside the supported subset; callers skip rather than fail
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            PathError::UnsupportedFunction { .. } | PathError::Unsupported { .. }
        )
    }
}

/// Owned result of evaluating a path
#[derive(Debug, Clone, PartialEq)]
pub enum PathValue {
    Scalar {
        value: JsonValue,
        type_name: Option<String>,
    },
    Element(Element),
}

impl PathValue {
    pub fn as_scalar(&self) -> Option<&JsonValue> {
        match self {
            PathValue::Scalar { value, .. } => Some(value),
            PathValue::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            PathValue::Element(element) => Some(element),
            PathValue::Scalar { .. } => None,
        }
    }

    /// Null, empty strings and `false` are falsy; everything else is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            PathValue::Scalar { value, .. } => match value {
                JsonValue::Null => false,
                JsonValue::Bool(flag) => *flag,
                JsonValue::String(text) => !text.trim().is_empty(),
                _ => true,
            },
            PathValue::Element(_) => true,
        }
    }
}

/// A path query engine
pub trait PathEngine {
    /// Parse text into the segment form used by the mutation engine
    fn parse(&self, text: &str) -> Result<PathExpression, PathError>;

    /// Evaluate text against an element tree
    fn evaluate(&self, root: &Element, text: &str) -> Result<Vec<PathValue>, PathError>;
}

/// Built-in FHIRPath subset
#[derive(Debug, Clone, Copy, Default)]
pub struct FhirPathLite;

impl PathEngine for FhirPathLite {
    fn parse(&self, text: &str) -> Result<PathExpression, PathError> {
        let expr = parse_expression(text)?;
        Ok(PathExpression::from_expr(&expr))
    }

    fn evaluate(&self, root: &Element, text: &str) -> Result<Vec<PathValue>, PathError> {
        let expr = parse_expression(text)?;
        let items = evaluator::evaluate(&expr, root)?;
        Ok(items.iter().map(evaluator::Item::to_value).collect())
    }
}
