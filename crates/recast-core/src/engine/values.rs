//! Mapping values and their expansion into flat path assignments

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::model::{Element, scalar_text};
use crate::result::{Result, ResultExt};
use crate::transforms::ValueTransform;

/// Value side of a mapping entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "JsonValue")]
pub enum ValueSpec {
    /// A raw scalar; `null` means "leave unset"
    Literal(JsonValue),
    /// Nested fields, each resolved as `<parent>.<key>`
    Map(IndexMap<String, ValueSpec>),
    /// Items resolved positionally as `<parent>[i]`
    List(Vec<ValueSpec>),
    /// A `$name([args])` string resolved before assignment
    Directive(String),
    /// A composite value already resolved from a document
    Element(Element),
}

impl Default for ValueSpec {
    fn default() -> Self {
        ValueSpec::Literal(JsonValue::Null)
    }
}

impl From<JsonValue> for ValueSpec {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::String(text) if text.starts_with('$') => ValueSpec::Directive(text),
            JsonValue::Object(map) => ValueSpec::Map(
                map.into_iter()
                    .map(|(key, value)| (key, ValueSpec::from(value)))
                    .collect(),
            ),
            JsonValue::Array(items) => {
                ValueSpec::List(items.into_iter().map(ValueSpec::from).collect())
            }
            other => ValueSpec::Literal(other),
        }
    }
}

/// One `location`/`value` pair from a mapping
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappingEntry {
    pub location: String,
    #[serde(default)]
    pub value: ValueSpec,
    #[serde(default)]
    pub transform: Option<ValueTransform>,
}

impl MappingEntry {
    pub fn new(location: impl Into<String>, value: impl Into<ValueSpec>) -> Self {
        Self {
            location: location.into(),
            value: value.into(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: ValueTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Resolves directive strings for [`expand_entries`]
pub trait DirectiveSource {
    /// `Ok(None)` means the directive produced nothing and the entry is skipped
    fn resolve(&self, directive: &str) -> Result<Option<ValueSpec>>;
}

/// Value to place at the end of a path
#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    Scalar(JsonValue),
    Element(Element),
}

/// A single path and the value it receives
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub location: String,
    pub value: AssignValue,
}

impl Assignment {
    pub fn scalar(location: impl Into<String>, value: JsonValue) -> Self {
        Self {
            location: location.into(),
            value: AssignValue::Scalar(value),
        }
    }
}

/// Resolve directives, apply transforms and flatten maps and lists
pub fn expand_entries(
    entries: &[MappingEntry],
    source: &dyn DirectiveSource,
) -> Result<Vec<Assignment>> {
    let mut out = Vec::new();
    for entry in entries {
        expand(
            &entry.location,
            &entry.value,
            entry.transform,
            source,
            &mut out,
        )?;
    }
    Ok(out)
}

fn expand(
    location: &str,
    spec: &ValueSpec,
    transform: Option<ValueTransform>,
    source: &dyn DirectiveSource,
    out: &mut Vec<Assignment>,
) -> Result<()> {
    match spec {
        ValueSpec::Literal(JsonValue::Null) => {
            debug!("No value for '{}', leaving it unset", location);
        }
        ValueSpec::Literal(value) => {
            if let Some(value) = transform_scalar(location, value, transform)? {
                out.push(Assignment::scalar(location, value));
            }
        }
        ValueSpec::Directive(text) => match source.resolve(text)? {
            None => debug!("'{}' resolved to nothing, skipping '{}'", text, location),
            // A directive result is data, never another directive
            Some(ValueSpec::Directive(literal)) => {
                let literal = JsonValue::String(literal);
                if let Some(value) = transform_scalar(location, &literal, transform)? {
                    out.push(Assignment::scalar(location, value));
                }
            }
            Some(resolved) => expand(location, &resolved, transform, source, out)?,
        },
        ValueSpec::Map(fields) => {
            for (key, value) in fields {
                expand(&format!("{location}.{key}"), value, transform, source, out)?;
            }
        }
        ValueSpec::List(items) => {
            for (index, item) in items.iter().enumerate() {
                expand(&format!("{location}[{index}]"), item, transform, source, out)?;
            }
        }
        ValueSpec::Element(element) => {
            if transform.is_some() {
                warn!("Ignoring transform on composite value for '{}'", location);
            }
            out.push(Assignment {
                location: location.to_string(),
                value: AssignValue::Element(element.clone()),
            });
        }
    }
    Ok(())
}

fn transform_scalar(
    location: &str,
    value: &JsonValue,
    transform: Option<ValueTransform>,
) -> Result<Option<JsonValue>> {
    let Some(transform) = transform else {
        return Ok(Some(value.clone()));
    };
    let text = transform
        .apply(&scalar_text(value))
        .recoverable(format_args!("Skipping '{location}'"))?;
    Ok(text.map(JsonValue::String))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed;

    impl DirectiveSource for Fixed {
        fn resolve(&self, directive: &str) -> Result<Option<ValueSpec>> {
            Ok(match directive {
                "$setRef([])" => Some(ValueSpec::Literal(json!("Patient/p1"))),
                "$code([])" => Some(ValueSpec::from(json!({"system": "s", "code": "c"}))),
                _ => None,
            })
        }
    }

    fn locations(assignments: &[Assignment]) -> Vec<(&str, &AssignValue)> {
        assignments
            .iter()
            .map(|a| (a.location.as_str(), &a.value))
            .collect()
    }

    #[test]
    fn test_value_spec_from_json() {
        assert_eq!(
            ValueSpec::from(json!("$getField([Patient.id])")),
            ValueSpec::Directive("$getField([Patient.id])".into())
        );
        assert_eq!(ValueSpec::from(json!(true)), ValueSpec::Literal(json!(true)));
        assert!(matches!(ValueSpec::from(json!({"a": 1})), ValueSpec::Map(_)));
        assert!(matches!(ValueSpec::from(json!([1, 2])), ValueSpec::List(_)));
    }

    #[test]
    fn test_nested_maps_flatten_to_any_depth() {
        let entry = MappingEntry::new(
            "Observation.code",
            ValueSpec::from(json!({
                "coding": {"system": "http://loinc.org", "code": "1234-5"},
                "text": "Lab"
            })),
        );
        let out = expand_entries(&[entry], &Fixed).unwrap();
        assert_eq!(
            locations(&out),
            vec![
                (
                    "Observation.code.coding.system",
                    &AssignValue::Scalar(json!("http://loinc.org"))
                ),
                (
                    "Observation.code.coding.code",
                    &AssignValue::Scalar(json!("1234-5"))
                ),
                ("Observation.code.text", &AssignValue::Scalar(json!("Lab"))),
            ]
        );
    }

    #[test]
    fn test_lists_expand_with_indexes() {
        let entry = MappingEntry::new("Patient.name.given", ValueSpec::from(json!(["A", "B"])));
        let out = expand_entries(&[entry], &Fixed).unwrap();
        assert_eq!(out[0].location, "Patient.name.given[0]");
        assert_eq!(out[1].location, "Patient.name.given[1]");
    }

    #[test]
    fn test_directives_resolve_or_skip() {
        let entries = vec![
            MappingEntry::new("Encounter.subject.reference", ValueSpec::from(json!("$setRef([])"))),
            MappingEntry::new("Encounter.type.coding", ValueSpec::from(json!("$code([])"))),
            MappingEntry::new("Encounter.status", ValueSpec::from(json!("$missing([])"))),
            MappingEntry::new("Encounter.language", ValueSpec::Literal(JsonValue::Null)),
        ];
        let out = expand_entries(&entries, &Fixed).unwrap();
        let paths: Vec<_> = out.iter().map(|a| a.location.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Encounter.subject.reference",
                "Encounter.type.coding.system",
                "Encounter.type.coding.code",
            ]
        );
    }

    #[test]
    fn test_transform_applies_and_failures_skip() {
        let entries = vec![
            MappingEntry::new("Patient.birthDate", ValueSpec::from(json!("2020-03-04T10:11:12Z")))
                .with_transform(ValueTransform::ToDate),
            MappingEntry::new("Patient.deceasedDateTime", ValueSpec::from(json!("not a date")))
                .with_transform(ValueTransform::ToDateTime),
        ];
        let out = expand_entries(&entries, &Fixed).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, AssignValue::Scalar(json!("2020-03-04")));
    }
}
