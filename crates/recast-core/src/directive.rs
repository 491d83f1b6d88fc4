//! `$name([args])` directives used as mapping values

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::engine::{DirectiveSource, ValueSpec};
use crate::error::RecastError;
use crate::model::{Bundle, Document, scalar_text};
use crate::path::{PathEvaluator, PathValue};
use crate::result::Result;
use crate::subject::SubjectContext;
use crate::valueset::CodeRegistry;

static DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$(\w+)\(\[(.*)\]\)$").expect("valid directive regex"));

/// A parsed directive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
}

impl Directive {
    pub fn parse(text: &str) -> Option<Self> {
        let caps = DIRECTIVE.captures(text.trim())?;
        Some(Self {
            name: caps[1].to_string(),
            args: split_args(&caps[2]),
        })
    }

    fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str).filter(|a| !a.is_empty())
    }
}

/// Split on commas outside of parentheses, brackets and quotes
fn split_args(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for ch in text.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    args.push(current.trim().to_string());
    args
}

/// Resolves directives for one target document within a bundle
pub struct DirectiveResolver<'a> {
    mapping: &'a str,
    bundle: &'a Bundle,
    current: Option<&'a Document>,
    evaluator: &'a PathEvaluator<'a>,
    subject: Option<&'a dyn SubjectContext>,
    codes: &'a CodeRegistry,
    strict: bool,
}

impl<'a> DirectiveResolver<'a> {
    pub fn new(
        mapping: &'a str,
        bundle: &'a Bundle,
        evaluator: &'a PathEvaluator<'a>,
        codes: &'a CodeRegistry,
    ) -> Self {
        Self {
            mapping,
            bundle,
            current: None,
            evaluator,
            subject: None,
            codes,
            strict: false,
        }
    }

    /// The document `setRef` and `getField` refer to
    pub fn with_current(mut self, document: Option<&'a Document>) -> Self {
        self.current = document;
        self
    }

    pub fn with_subject(mut self, subject: Option<&'a dyn SubjectContext>) -> Self {
        self.subject = subject;
        self
    }

    /// Unresolved `findRef` targets become errors instead of nulls
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn current(&self, directive: &Directive) -> Option<&'a Document> {
        if self.current.is_none() {
            warn!("${} has no current resource to read from", directive.name);
        }
        self.current
    }

    fn set_ref(&self, directive: &Directive) -> Option<ValueSpec> {
        let reference = self.current(directive)?.reference();
        if reference.is_none() {
            warn!("${} on a resource without an id", directive.name);
        }
        reference.map(|r| ValueSpec::Literal(JsonValue::String(r)))
    }

    fn get_field(&self, directive: &Directive) -> Result<Option<ValueSpec>> {
        let (Some(document), Some(path)) = (self.current(directive), directive.arg(0)) else {
            return Ok(None);
        };
        Ok(self
            .evaluator
            .evaluate(document, path)?
            .into_iter()
            .next()
            .map(value_spec))
    }

    fn find_ref(&self, directive: &Directive) -> Result<Option<ValueSpec>> {
        let Some(path) = directive.arg(0) else {
            return Ok(None);
        };
        let reference = self
            .evaluator
            .select_documents(self.bundle, path)?
            .into_iter()
            .find_map(|index| self.bundle.document(index).and_then(Document::reference));

        match reference {
            Some(reference) => Ok(Some(ValueSpec::Literal(JsonValue::String(reference)))),
            None if self.strict => Err(RecastError::unresolved_reference(
                self.mapping,
                self.current
                    .map(Document::identity)
                    .unwrap_or_else(|| "bundle".to_string()),
                path,
            )),
            None => {
                warn!("$findRef found nothing for '{}'", path);
                Ok(None)
            }
        }
    }

    fn find_value(&self, directive: &Directive) -> Result<Option<ValueSpec>> {
        let Some(path) = directive.arg(0) else {
            return Ok(None);
        };
        Ok(self
            .evaluator
            .evaluate_bundle(self.bundle, path)?
            .iter()
            .find_map(PathValue::as_scalar)
            .map(|value| ValueSpec::Literal(value.clone())))
    }

    fn get_attribute(&self, directive: &Directive) -> Option<ValueSpec> {
        let name = directive.arg(0)?;
        let Some(subject) = self.subject else {
            warn!("$getAttribute({}) needs a subject, none was provided", name);
            return None;
        };
        let value = subject.attribute(name)?;
        let text = match value {
            JsonValue::Null => return None,
            JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
            _ => scalar_text(value),
        };
        Some(ValueSpec::Literal(JsonValue::String(text)))
    }

    fn random_code(&self, directive: &Directive) -> Option<ValueSpec> {
        let url = directive.arg(0)?;
        let Some(code) = self.codes.random_code(url) else {
            warn!("$randomCode: ValueSet '{}' is not loaded", url);
            return None;
        };
        Some(ValueSpec::Map(
            [
                ("system", code.system),
                ("code", code.code),
                ("display", code.display),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), ValueSpec::Literal(JsonValue::String(value))))
            .collect(),
        ))
    }
}

impl DirectiveSource for DirectiveResolver<'_> {
    fn resolve(&self, text: &str) -> Result<Option<ValueSpec>> {
        let Some(directive) = Directive::parse(text) else {
            warn!("Malformed directive '{}', expected $name([args])", text);
            return Ok(None);
        };
        debug!("Resolving ${} with {:?}", directive.name, directive.args);

        match directive.name.as_str() {
            "setRef" => Ok(self.set_ref(&directive)),
            "getField" => self.get_field(&directive),
            "findRef" => self.find_ref(&directive),
            "findValue" => self.find_value(&directive),
            "getAttribute" => Ok(self.get_attribute(&directive)),
            "randomCode" => Ok(self.random_code(&directive)),
            other => {
                warn!("Unknown directive ${}, leaving the value unset", other);
                Ok(None)
            }
        }
    }
}

fn value_spec(value: PathValue) -> ValueSpec {
    match value {
        PathValue::Scalar { value, .. } => ValueSpec::Literal(value),
        PathValue::Element(element) => ValueSpec::Element(element),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FhirPathLite;
    use crate::schema::SchemaTable;
    use crate::subject::SubjectRecord;
    use indexmap::IndexMap;
    use serde_json::json;

    fn bundle() -> Bundle {
        Bundle::from_json(
            &json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "p1", "gender": "female"}},
                    {"resource": {
                        "resourceType": "Encounter",
                        "id": "e1",
                        "status": "finished",
                        "class": {"system": "http://terminology.hl7.org/CodeSystem/v3-ActCode", "code": "AMB"}
                    }}
                ]
            }),
            &SchemaTable::r4_core(),
        )
        .unwrap()
    }

    fn resolve(
        bundle: &Bundle,
        current: Option<&Document>,
        text: &str,
        strict: bool,
    ) -> Result<Option<ValueSpec>> {
        let variables = IndexMap::new();
        let evaluator = PathEvaluator::new(&FhirPathLite, &variables);
        let codes = CodeRegistry::new(Some(1));
        let subject = SubjectRecord::default()
            .with_attribute("smoker", json!(true))
            .with_attribute("city", json!("Bedford"));
        DirectiveResolver::new("test", bundle, &evaluator, &codes)
            .with_current(current)
            .with_subject(Some(&subject))
            .strict(strict)
            .resolve(text)
    }

    #[test]
    fn test_parse_directives() {
        assert_eq!(
            Directive::parse("$findRef([Patient])").unwrap(),
            Directive {
                name: "findRef".into(),
                args: vec!["Patient".into()]
            }
        );
        assert_eq!(
            Directive::parse("$getField([Encounter.type.where(a = 'x, y'), same])")
                .unwrap()
                .args,
            vec!["Encounter.type.where(a = 'x, y')", "same"]
        );
        assert!(Directive::parse("$setRef([])").unwrap().args.is_empty());
        assert!(Directive::parse("plain text").is_none());
        assert!(Directive::parse("$getField(Patient.id)").is_none());
    }

    #[test]
    fn test_set_ref_and_get_field() {
        let bundle = bundle();
        let encounter = bundle.document(1);
        assert_eq!(
            resolve(&bundle, encounter, "$setRef([])", false).unwrap(),
            Some(ValueSpec::Literal(json!("Encounter/e1")))
        );
        assert_eq!(
            resolve(&bundle, encounter, "$getField([Encounter.status])", false).unwrap(),
            Some(ValueSpec::Literal(json!("finished")))
        );
        assert!(matches!(
            resolve(&bundle, encounter, "$getField([Encounter.class])", false).unwrap(),
            Some(ValueSpec::Element(_))
        ));
        assert_eq!(
            resolve(&bundle, encounter, "$getField([Encounter.priority])", false).unwrap(),
            None
        );
        assert_eq!(resolve(&bundle, None, "$setRef([])", false).unwrap(), None);
    }

    #[test]
    fn test_find_ref_and_value() {
        let bundle = bundle();
        assert_eq!(
            resolve(&bundle, None, "$findRef([Patient])", false).unwrap(),
            Some(ValueSpec::Literal(json!("Patient/p1")))
        );
        assert_eq!(
            resolve(&bundle, None, "$findValue([Patient.gender])", false).unwrap(),
            Some(ValueSpec::Literal(json!("female")))
        );
        assert_eq!(
            resolve(&bundle, None, "$findRef([Practitioner])", false).unwrap(),
            None
        );
    }

    #[test]
    fn test_find_value_skips_composites() {
        let bundle = bundle();
        assert_eq!(
            resolve(&bundle, None, "$findValue([Encounter.class | Encounter.status])", false)
                .unwrap(),
            Some(ValueSpec::Literal(json!("finished")))
        );
        assert_eq!(
            resolve(&bundle, None, "$findValue([Encounter.class])", false).unwrap(),
            None
        );
    }

    #[test]
    fn test_strict_find_ref_miss_is_fatal() {
        let bundle = bundle();
        let err = resolve(&bundle, bundle.document(1), "$findRef([Practitioner])", true)
            .unwrap_err();
        match err {
            RecastError::UnresolvedReference {
                mapping,
                source_document,
                target,
            } => {
                assert_eq!(mapping, "test");
                assert_eq!(source_document, "Encounter/e1");
                assert_eq!(target, "Practitioner");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_attributes_and_unknown_names() {
        let bundle = bundle();
        assert_eq!(
            resolve(&bundle, None, "$getAttribute([smoker])", false).unwrap(),
            Some(ValueSpec::Literal(json!("true")))
        );
        assert_eq!(
            resolve(&bundle, None, "$getAttribute([missing])", false).unwrap(),
            None
        );
        assert_eq!(resolve(&bundle, None, "$explode([now])", false).unwrap(), None);
        assert_eq!(
            resolve(&bundle, None, "$randomCode([urn:not-loaded])", false).unwrap(),
            None
        );
    }

    #[test]
    fn test_random_code_expands_to_coding_fields() {
        let bundle = bundle();
        let variables = IndexMap::new();
        let evaluator = PathEvaluator::new(&FhirPathLite, &variables);
        let mut codes = CodeRegistry::new(Some(9));
        codes
            .load_value_set(&json!({
                "resourceType": "ValueSet",
                "url": "urn:vs:one",
                "compose": {"include": [{"system": "urn:cs", "concept": [{"code": "a", "display": "A"}]}]}
            }))
            .unwrap();
        let resolver = DirectiveResolver::new("test", &bundle, &evaluator, &codes);
        let ValueSpec::Map(fields) = resolver.resolve("$randomCode([urn:vs:one])").unwrap().unwrap()
        else {
            panic!("expected a map");
        };
        assert_eq!(fields["system"], ValueSpec::Literal(json!("urn:cs")));
        assert_eq!(fields["code"], ValueSpec::Literal(json!("a")));
        assert_eq!(fields["display"], ValueSpec::Literal(json!("A")));
    }
}
