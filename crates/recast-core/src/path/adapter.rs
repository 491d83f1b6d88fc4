//! Resolves path expressions against a single document or a whole bundle

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::{PathEngine, PathValue};
use crate::error::RecastError;
use crate::model::{Bundle, Document, Element, scalar_text};
use crate::result::Result;

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)").expect("valid variable regex"));

/// Path evaluation with mapping variables substituted into the text
pub struct PathEvaluator<'a> {
    engine: &'a dyn PathEngine,
    variables: &'a IndexMap<String, JsonValue>,
}

impl<'a> PathEvaluator<'a> {
    pub fn new(engine: &'a dyn PathEngine, variables: &'a IndexMap<String, JsonValue>) -> Self {
        Self { engine, variables }
    }

    pub fn engine(&self) -> &'a dyn PathEngine {
        self.engine
    }

    /// Replace `%name` with the variable's value; unknown names stay as written
    pub fn substitute(&self, path: &str) -> String {
        if self.variables.is_empty() {
            return path.to_string();
        }
        VARIABLE
            .replace_all(path, |caps: &Captures<'_>| match self.variables.get(&caps[1]) {
                Some(value) => render_variable(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// All values `path` selects on one document
    pub fn evaluate(&self, document: &Document, path: &str) -> Result<Vec<PathValue>> {
        self.evaluate_element(document.root(), path)
    }

    /// Values `path` selects across the bundle: once on the bundle view when
    /// the path is rooted at `Bundle`, otherwise concatenated per document
    pub fn evaluate_bundle(&self, bundle: &Bundle, path: &str) -> Result<Vec<PathValue>> {
        if is_bundle_rooted(path) {
            return self.evaluate_element(&bundle.to_element(), path);
        }
        let mut out = Vec::new();
        for document in bundle.documents() {
            out.extend(self.evaluate(document, path)?);
        }
        Ok(out)
    }

    /// Indexes of the documents `path` selects, in bundle order
    pub fn select_documents(&self, bundle: &Bundle, path: &str) -> Result<Vec<usize>> {
        if is_bundle_rooted(path) {
            let mut selected = Vec::new();
            for value in self.evaluate_element(&bundle.to_element(), path)? {
                let Some(index) = value.as_element().and_then(|e| resource_position(bundle, e))
                else {
                    continue;
                };
                if !selected.contains(&index) {
                    selected.push(index);
                }
            }
            return Ok(selected);
        }

        let mut selected = Vec::new();
        for (index, document) in bundle.documents().enumerate() {
            if is_truthy(&self.evaluate(document, path)?) {
                selected.push(index);
            }
        }
        debug!("'{}' selected {} of {} documents", path, selected.len(), bundle.len());
        Ok(selected)
    }

    pub fn applies_to(&self, document: &Document, path: &str) -> Result<bool> {
        Ok(is_truthy(&self.evaluate(document, path)?))
    }

    pub fn applies_to_bundle(&self, bundle: &Bundle, path: &str) -> Result<bool> {
        Ok(is_truthy(&self.evaluate_bundle(bundle, path)?))
    }

    fn evaluate_element(&self, root: &Element, path: &str) -> Result<Vec<PathValue>> {
        let text = self.substitute(path);
        match self.engine.evaluate(root, &text) {
            Ok(values) => Ok(values),
            Err(err) if err.is_unsupported() => {
                warn!("Ignoring path '{}': {}", text, err);
                Ok(Vec::new())
            }
            Err(err) => Err(RecastError::path_error(text, err)),
        }
    }
}

/// A result list is truthy when any item is
pub fn is_truthy(values: &[PathValue]) -> bool {
    values.iter().any(PathValue::is_truthy)
}

/// The first identifier of the path is literally `Bundle`
fn is_bundle_rooted(path: &str) -> bool {
    let path = path.trim_start();
    path.strip_prefix("Bundle")
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

fn resource_position(bundle: &Bundle, element: &Element) -> Option<usize> {
    let resource_type = element.primitive_text("resourceType")?;
    let id = element.primitive_text("id")?;
    bundle.position(&resource_type, &id)
}

fn render_variable(value: &JsonValue) -> String {
    match value {
        JsonValue::Array(items) => {
            let rendered: Vec<String> = items.iter().map(quote_once).collect();
            format!("({})", rendered.join(" | "))
        }
        JsonValue::String(text) => quote_once(&JsonValue::String(text.clone())),
        other => scalar_text(other),
    }
}

fn quote_once(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) if is_quoted(text) => text.clone(),
        JsonValue::String(text) => format!("'{}'", text.replace('\'', "\\'")),
        other => scalar_text(other),
    }
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FhirPathLite;
    use crate::schema::SchemaTable;
    use serde_json::json;

    fn bundle() -> Bundle {
        let schema = SchemaTable::r4_core();
        Bundle::from_json(
            &json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "p1", "gender": "male"}},
                    {"resource": {"resourceType": "Encounter", "id": "e1", "status": "finished",
                        "class": {"code": "AMB"}}},
                    {"resource": {"resourceType": "Encounter", "id": "e2", "status": "planned",
                        "class": {"code": "EMER"}}}
                ]
            }),
            &schema,
        )
        .unwrap()
    }

    #[test]
    fn test_variable_substitution() {
        let engine = FhirPathLite;
        let mut variables = IndexMap::new();
        variables.insert("codes".to_string(), json!(["AMB", "'EMER'"]));
        variables.insert("status".to_string(), json!("finished"));
        variables.insert("limit".to_string(), json!(3));
        let evaluator = PathEvaluator::new(&engine, &variables);

        assert_eq!(
            evaluator.substitute("Encounter.class.code in %codes"),
            "Encounter.class.code in ('AMB' | 'EMER')"
        );
        assert_eq!(
            evaluator.substitute("Encounter.status = %status and %limit > 1"),
            "Encounter.status = 'finished' and 3 > 1"
        );
        assert_eq!(evaluator.substitute("%resource.id"), "%resource.id");
    }

    #[test]
    fn test_select_documents_per_document() {
        let engine = FhirPathLite;
        let variables = IndexMap::new();
        let evaluator = PathEvaluator::new(&engine, &variables);
        let bundle = bundle();

        assert_eq!(evaluator.select_documents(&bundle, "Encounter").unwrap(), vec![1, 2]);
        assert_eq!(
            evaluator
                .select_documents(&bundle, "Encounter.status = 'planned'")
                .unwrap(),
            vec![2]
        );
        assert!(evaluator.select_documents(&bundle, "Observation").unwrap().is_empty());
    }

    #[test]
    fn test_bundle_rooted_selection_maps_back_to_documents() {
        let engine = FhirPathLite;
        let variables = IndexMap::new();
        let evaluator = PathEvaluator::new(&engine, &variables);
        let bundle = bundle();

        let selected = evaluator
            .select_documents(
                &bundle,
                "Bundle.entry.resource.ofType(Encounter).where(class.code = 'EMER')",
            )
            .unwrap();
        assert_eq!(selected, vec![2]);
        assert!(evaluator.applies_to_bundle(&bundle, "Bundle.type = 'transaction'").unwrap());
    }

    #[test]
    fn test_evaluate_bundle_values() {
        let engine = FhirPathLite;
        let variables = IndexMap::new();
        let evaluator = PathEvaluator::new(&engine, &variables);
        let values = evaluator.evaluate_bundle(&bundle(), "Encounter.status").unwrap();
        let texts: Vec<_> = values
            .iter()
            .filter_map(PathValue::as_scalar)
            .map(scalar_text)
            .collect();
        assert_eq!(texts, vec!["finished", "planned"]);
    }

    #[test]
    fn test_unsupported_is_empty_and_syntax_is_error() {
        let engine = FhirPathLite;
        let variables = IndexMap::new();
        let evaluator = PathEvaluator::new(&engine, &variables);
        let bundle = bundle();

        assert!(evaluator.select_documents(&bundle, "Patient.resolve()").unwrap().is_empty());
        let err = evaluator.select_documents(&bundle, "Patient.(").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Path);
    }

    #[test]
    fn test_truthiness_of_lists() {
        assert!(!is_truthy(&[]));
        let falsy = PathValue::Scalar {
            value: json!(false),
            type_name: None,
        };
        let truthy = PathValue::Scalar {
            value: json!("x"),
            type_name: None,
        };
        assert!(!is_truthy(std::slice::from_ref(&falsy)));
        assert!(is_truthy(&[falsy, truthy]));
    }

    #[test]
    fn test_bundle_root_detection() {
        assert!(is_bundle_rooted("Bundle.entry"));
        assert!(is_bundle_rooted("Bundle"));
        assert!(!is_bundle_rooted("BundleX.entry"));
        assert!(!is_bundle_rooted("Patient"));
    }
}
