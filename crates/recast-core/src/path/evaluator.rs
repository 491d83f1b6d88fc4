//! Tree-walking evaluator over document elements
//!
//! Collections are ordered lists of [`Item`]s borrowed from the evaluated
//! tree; literals and computed values are owned.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Value as JsonValue, json};

use super::parser::{BinaryOp, Expr, Literal, TypeOp};
use super::{PathError, PathValue};
use crate::model::{Element, Node, Primitive, scalar_text};

#[derive(Debug, Clone)]
pub enum Item<'a> {
    Element(&'a Element),
    Primitive(&'a Primitive),
    Value(JsonValue),
}

impl<'a> Item<'a> {
    fn from_node(node: &'a Node) -> Self {
        match node {
            Node::Primitive(primitive) => Item::Primitive(primitive),
            Node::Element(element) => Item::Element(element),
        }
    }

    fn scalar(&self) -> Option<&JsonValue> {
        match self {
            Item::Primitive(primitive) => primitive.value.as_ref(),
            Item::Value(value) => Some(value),
            Item::Element(_) => None,
        }
    }

    fn text(&self) -> Option<String> {
        self.scalar().map(scalar_text)
    }

    fn type_name(&self) -> Option<String> {
        match self {
            Item::Element(element) => element.type_name.clone(),
            Item::Primitive(primitive) => primitive
                .type_name
                .clone()
                .or_else(|| primitive.value.as_ref().map(json_type).map(str::to_string)),
            Item::Value(value) => Some(json_type(value).to_string()),
        }
    }

    pub fn to_value(&self) -> PathValue {
        match self {
            Item::Element(element) => PathValue::Element((*element).clone()),
            Item::Primitive(primitive) => PathValue::Scalar {
                value: primitive.value.clone().unwrap_or(JsonValue::Null),
                type_name: primitive.type_name.clone(),
            },
            Item::Value(value) => PathValue::Scalar {
                value: value.clone(),
                type_name: None,
            },
        }
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(number) if number.is_f64() => "decimal",
        JsonValue::Number(_) => "integer",
        _ => "string",
    }
}

type Collection<'a> = Vec<Item<'a>>;

/// Evaluate an expression with `root` as both the initial focus and `%resource`
pub fn evaluate<'a>(expr: &Expr, root: &'a Element) -> Result<Collection<'a>, PathError> {
    let evaluator = Evaluator { root };
    evaluator.eval(expr, &vec![Item::Element(root)])
}

struct Evaluator<'a> {
    root: &'a Element,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr, focus: &Collection<'a>) -> Result<Collection<'a>, PathError> {
        match expr {
            Expr::Literal(literal) => Ok(vec![Item::Value(literal_value(literal))]),
            Expr::This => Ok(focus.clone()),
            Expr::Variable(name) => self.variable(name),
            Expr::Identifier(name) => Ok(self.identifier(focus, name)),
            Expr::Member { target, name } => {
                let base = self.eval(target, focus)?;
                Ok(navigate(&base, name))
            }
            Expr::Index { target, index } => {
                let base = self.eval(target, focus)?;
                let position = self.eval(index, focus)?;
                let position = single_integer(&position).ok_or_else(|| PathError::Unsupported {
                    construct: "non-integer indexer".to_string(),
                })?;
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|i| base.get(i).cloned())
                    .into_iter()
                    .collect())
            }
            Expr::Call { target, name, args } => {
                let base = match target {
                    Some(target) => self.eval(target, focus)?,
                    None => focus.clone(),
                };
                self.call(name, &base, args)
            }
            Expr::Negate(operand) => {
                let value = self.eval(operand, focus)?;
                Ok(match single_number(&value) {
                    Some(n) => vec![Item::Value(number_value(-n))],
                    None => Vec::new(),
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, focus)?;
                let right = self.eval(rhs, focus)?;
                binary(*op, left, right)
            }
            Expr::TypeTest {
                op,
                operand,
                type_name,
            } => {
                let value = self.eval(operand, focus)?;
                Ok(match op {
                    TypeOp::As => value
                        .into_iter()
                        .filter(|item| type_matches(item, type_name))
                        .collect(),
                    TypeOp::Is => match value.as_slice() {
                        [item] => vec![boolean(type_matches(item, type_name))],
                        _ => Vec::new(),
                    },
                })
            }
        }
    }

    fn variable(&self, name: &str) -> Result<Collection<'a>, PathError> {
        match name {
            "resource" | "context" | "rootResource" => Ok(vec![Item::Element(self.root)]),
            "ucum" => Ok(vec![Item::Value(json!("http://unitsofmeasure.org"))]),
            "sct" => Ok(vec![Item::Value(json!("http://snomed.info/sct"))]),
            "loinc" => Ok(vec![Item::Value(json!("http://loinc.org"))]),
            other => Err(PathError::Unsupported {
                construct: format!("%{other}"),
            }),
        }
    }

    /// A leading type name selects matching focus items; anything else is a field
    fn identifier(&self, focus: &Collection<'a>, name: &str) -> Collection<'a> {
        if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            let typed: Collection<'a> = focus
                .iter()
                .filter(|item| type_matches(item, name))
                .cloned()
                .collect();
            if !typed.is_empty() {
                return typed;
            }
        }
        navigate(focus, name)
    }

    fn call(
        &self,
        name: &str,
        base: &Collection<'a>,
        args: &[Expr],
    ) -> Result<Collection<'a>, PathError> {
        match (name, args) {
            ("where", [criteria]) => {
                let mut out = Vec::new();
                for item in base {
                    let result = self.eval(criteria, &vec![item.clone()])?;
                    if as_boolean(&result) == Some(true) {
                        out.push(item.clone());
                    }
                }
                Ok(out)
            }
            ("select", [projection]) => {
                let mut out = Vec::new();
                for item in base {
                    out.extend(self.eval(projection, &vec![item.clone()])?);
                }
                Ok(out)
            }
            ("exists", []) => Ok(vec![boolean(!base.is_empty())]),
            ("exists", [criteria]) => {
                for item in base {
                    let result = self.eval(criteria, &vec![item.clone()])?;
                    if as_boolean(&result) == Some(true) {
                        return Ok(vec![boolean(true)]);
                    }
                }
                Ok(vec![boolean(false)])
            }
            ("all", [criteria]) => {
                for item in base {
                    let result = self.eval(criteria, &vec![item.clone()])?;
                    if as_boolean(&result) != Some(true) {
                        return Ok(vec![boolean(false)]);
                    }
                }
                Ok(vec![boolean(true)])
            }
            ("empty", []) => Ok(vec![boolean(base.is_empty())]),
            ("count", []) => Ok(vec![Item::Value(json!(base.len()))]),
            ("first", []) => Ok(base.first().cloned().into_iter().collect()),
            ("last", []) => Ok(base.last().cloned().into_iter().collect()),
            ("tail", []) => Ok(base.iter().skip(1).cloned().collect()),
            ("not", []) => Ok(match as_boolean(base) {
                Some(flag) => vec![boolean(!flag)],
                None => Vec::new(),
            }),
            ("hasValue", []) => Ok(vec![boolean(matches!(
                base.as_slice(),
                [Item::Primitive(Primitive { value: Some(_), .. })]
            ))]),
            ("ofType", [type_expr]) => {
                let type_name = type_name_of(type_expr)?;
                Ok(base
                    .iter()
                    .filter(|item| type_matches(item, &type_name))
                    .cloned()
                    .collect())
            }
            ("as", [type_expr]) => {
                let type_name = type_name_of(type_expr)?;
                Ok(base
                    .iter()
                    .filter(|item| type_matches(item, &type_name))
                    .cloned()
                    .collect())
            }
            ("is", [type_expr]) => {
                let type_name = type_name_of(type_expr)?;
                Ok(match base.as_slice() {
                    [item] => vec![boolean(type_matches(item, &type_name))],
                    _ => Vec::new(),
                })
            }
            ("extension", [url_expr]) => {
                let url = self.eval(url_expr, base)?;
                let Some(url) = url.first().and_then(Item::text) else {
                    return Ok(Vec::new());
                };
                Ok(navigate(base, "extension")
                    .into_iter()
                    .filter(|item| match item {
                        Item::Element(element) => {
                            element.primitive_text("url").as_deref() == Some(url.as_str())
                        }
                        _ => false,
                    })
                    .collect())
            }
            ("iif", [condition, then_branch, rest @ ..]) if rest.len() <= 1 => {
                let result = self.eval(condition, base)?;
                if as_boolean(&result) == Some(true) {
                    self.eval(then_branch, base)
                } else if let Some(otherwise) = rest.first() {
                    self.eval(otherwise, base)
                } else {
                    Ok(Vec::new())
                }
            }
            ("toString", []) => Ok(base
                .iter()
                .filter_map(Item::text)
                .map(|text| Item::Value(JsonValue::String(text)))
                .collect()),
            ("lower", []) | ("upper", []) => Ok(base
                .iter()
                .filter_map(Item::text)
                .map(|text| {
                    Item::Value(JsonValue::String(if name == "lower" {
                        text.to_lowercase()
                    } else {
                        text.to_uppercase()
                    }))
                })
                .collect()),
            ("startsWith", [arg]) | ("endsWith", [arg]) | ("matches", [arg]) => {
                let argument = self.eval(arg, base)?;
                let (Some(subject), Some(pattern)) = (
                    single_item(base).and_then(Item::text),
                    single_item(&argument).and_then(Item::text),
                ) else {
                    return Ok(Vec::new());
                };
                let result = match name {
                    "startsWith" => subject.starts_with(&pattern),
                    "endsWith" => subject.ends_with(&pattern),
                    _ => Regex::new(&pattern)
                        .map_err(|e| PathError::Unsupported {
                            construct: format!("regex '{pattern}': {e}"),
                        })?
                        .is_match(&subject),
                };
                Ok(vec![boolean(result)])
            }
            (other, _) => Err(PathError::UnsupportedFunction {
                name: other.to_string(),
            }),
        }
    }
}

fn navigate<'a>(items: &[Item<'a>], name: &str) -> Collection<'a> {
    let mut out = Vec::new();
    for item in items {
        let element = match item {
            Item::Element(element) => *element,
            Item::Primitive(primitive) => &primitive.element,
            Item::Value(_) => continue,
        };
        match element.fields.get(name) {
            Some(slot) => out.extend(slot.nodes.iter().map(Item::from_node)),
            None => {
                // Choice fields: `value` finds `valueString`, `valueQuantity`, ...
                for (field, slot) in &element.fields {
                    if field.len() > name.len()
                        && field.starts_with(name)
                        && field[name.len()..].starts_with(|c: char| c.is_ascii_uppercase())
                    {
                        out.extend(slot.nodes.iter().map(Item::from_node));
                    }
                }
            }
        }
    }
    out
}

fn type_name_of(expr: &Expr) -> Result<String, PathError> {
    match expr {
        Expr::Identifier(name) => Ok(name.clone()),
        Expr::Member { name, .. } => Ok(name.clone()),
        other => Err(PathError::Unsupported {
            construct: format!("type specifier {other:?}"),
        }),
    }
}

fn type_matches(item: &Item<'_>, type_name: &str) -> bool {
    let wanted = normalize_type(type_name);
    if let Item::Element(element) = item
        && matches!(wanted.as_str(), "Resource" | "DomainResource")
    {
        return element.fields.contains_key("resourceType");
    }
    item.type_name()
        .map(|actual| normalize_type(&actual) == wanted)
        .unwrap_or(false)
}

/// `System.String` and `FHIR.string` both mean `string`
fn normalize_type(type_name: &str) -> String {
    let bare = type_name
        .strip_prefix("System.")
        .or_else(|| type_name.strip_prefix("FHIR."))
        .unwrap_or(type_name);
    match bare {
        "Boolean" => "boolean".to_string(),
        "String" => "string".to_string(),
        "Integer" => "integer".to_string(),
        "Decimal" => "decimal".to_string(),
        "Date" => "date".to_string(),
        "DateTime" => "dateTime".to_string(),
        "Time" => "time".to_string(),
        other => other.to_string(),
    }
}

fn literal_value(literal: &Literal) -> JsonValue {
    match literal {
        Literal::String(text) | Literal::DateTime(text) => JsonValue::String(text.clone()),
        Literal::Number(number) => number.clone(),
        Literal::Boolean(flag) => JsonValue::Bool(*flag),
    }
}

fn boolean<'a>(flag: bool) -> Item<'a> {
    Item::Value(JsonValue::Bool(flag))
}

fn number_value(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn single_item<'b, 'a>(items: &'b [Item<'a>]) -> Option<&'b Item<'a>> {
    match items {
        [item] => Some(item),
        _ => None,
    }
}

fn single_text(items: &[Item<'_>]) -> String {
    single_item(items).and_then(Item::text).unwrap_or_default()
}

fn single_number(items: &[Item<'_>]) -> Option<f64> {
    single_item(items).and_then(|item| match item.scalar()? {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.parse().ok(),
        _ => None,
    })
}

fn single_integer(items: &[Item<'_>]) -> Option<i64> {
    single_item(items).and_then(|item| item.scalar().and_then(JsonValue::as_i64))
}

/// Singleton evaluation: empty is unknown, a lone boolean is itself,
/// any other single item counts as true
fn as_boolean(items: &[Item<'_>]) -> Option<bool> {
    match items {
        [] => None,
        [item] => match item.scalar() {
            Some(JsonValue::Bool(flag)) => Some(*flag),
            _ => Some(true),
        },
        _ => Some(true),
    }
}

fn scalars_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Number(x), JsonValue::String(y)) | (JsonValue::String(y), JsonValue::Number(x)) => {
            y.parse::<f64>().ok() == x.as_f64()
        }
        _ => a == b,
    }
}

fn items_equal(a: &Item<'_>, b: &Item<'_>) -> bool {
    match (a, b) {
        (Item::Element(x), Item::Element(y)) => x == y,
        (Item::Element(_), _) | (_, Item::Element(_)) => false,
        _ => match (a.scalar(), b.scalar()) {
            (Some(x), Some(y)) => scalars_equal(x, y),
            _ => false,
        },
    }
}

fn items_equivalent(a: &Item<'_>, b: &Item<'_>) -> bool {
    match (a.scalar(), b.scalar()) {
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => {
            x.trim().eq_ignore_ascii_case(y.trim())
        }
        _ => items_equal(a, b),
    }
}

fn compare(a: &Item<'_>, b: &Item<'_>) -> Option<Ordering> {
    match (a.scalar()?, b.scalar()?) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn collections_equal(left: &[Item<'_>], right: &[Item<'_>]) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some(left.len() == right.len() && left.iter().zip(right).all(|(a, b)| items_equal(a, b)))
}

fn binary<'a>(
    op: BinaryOp,
    left: Collection<'a>,
    right: Collection<'a>,
) -> Result<Collection<'a>, PathError> {
    let from_option = |value: Option<bool>| -> Collection<'a> {
        value.map(|flag| vec![boolean(flag)]).unwrap_or_default()
    };

    Ok(match op {
        BinaryOp::Union => {
            let mut out: Collection<'a> = Vec::new();
            for item in left.into_iter().chain(right) {
                if !out.iter().any(|existing| items_equal(existing, &item)) {
                    out.push(item);
                }
            }
            out
        }
        BinaryOp::Equals => from_option(collections_equal(&left, &right)),
        BinaryOp::NotEquals => from_option(collections_equal(&left, &right).map(|eq| !eq)),
        BinaryOp::Equivalent | BinaryOp::NotEquivalent => {
            let equivalent = left.len() == right.len()
                && left
                    .iter()
                    .all(|a| right.iter().any(|b| items_equivalent(a, b)));
            vec![boolean(if op == BinaryOp::Equivalent {
                equivalent
            } else {
                !equivalent
            })]
        }
        BinaryOp::Less | BinaryOp::LessOrEqual | BinaryOp::Greater | BinaryOp::GreaterOrEqual => {
            let (Some(a), Some(b)) = (single_item(&left), single_item(&right)) else {
                return Ok(Vec::new());
            };
            match compare(a, b) {
                Some(ordering) => vec![boolean(match op {
                    BinaryOp::Less => ordering == Ordering::Less,
                    BinaryOp::LessOrEqual => ordering != Ordering::Greater,
                    BinaryOp::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })],
                None => Vec::new(),
            }
        }
        BinaryOp::In | BinaryOp::Contains => {
            let (needle, haystack) = if op == BinaryOp::In {
                (&left, &right)
            } else {
                (&right, &left)
            };
            match needle.as_slice() {
                [] => Vec::new(),
                [item] => vec![boolean(haystack.iter().any(|h| items_equal(item, h)))],
                _ => {
                    return Err(PathError::Unsupported {
                        construct: format!("'{}' with a multi-item operand", op.symbol()),
                    });
                }
            }
        }
        BinaryOp::And => from_option(match (as_boolean(&left), as_boolean(&right)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }),
        BinaryOp::Or => from_option(match (as_boolean(&left), as_boolean(&right)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        }),
        BinaryOp::Xor => from_option(match (as_boolean(&left), as_boolean(&right)) {
            (Some(a), Some(b)) => Some(a != b),
            _ => None,
        }),
        BinaryOp::Implies => from_option(match (as_boolean(&left), as_boolean(&right)) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), other) => other,
            (None, _) => None,
        }),
        BinaryOp::Concat => {
            vec![Item::Value(JsonValue::String(
                single_text(&left) + &single_text(&right),
            ))]
        }
        BinaryOp::Add
            if matches!(
                single_item(&left).and_then(Item::scalar),
                Some(JsonValue::String(_))
            ) =>
        {
            match (
                single_item(&left).and_then(Item::text),
                single_item(&right).and_then(Item::text),
            ) {
                (Some(a), Some(b)) => vec![Item::Value(JsonValue::String(a + &b))],
                _ => Vec::new(),
            }
        }
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Div
        | BinaryOp::Mod => {
            let (Some(a), Some(b)) = (single_number(&left), single_number(&right)) else {
                return Ok(Vec::new());
            };
            let result = match op {
                BinaryOp::Add => Some(a + b),
                BinaryOp::Subtract => Some(a - b),
                BinaryOp::Multiply => Some(a * b),
                BinaryOp::Divide => (b != 0.0).then(|| a / b),
                BinaryOp::Div => (b != 0.0).then(|| (a / b).trunc()),
                _ => (b != 0.0).then(|| a % b),
            };
            result
                .map(|n| vec![Item::Value(number_value(n))])
                .unwrap_or_default()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::path::parser::parse_expression;
    use crate::schema::SchemaTable;

    fn patient() -> Document {
        let schema = SchemaTable::r4_core();
        Document::from_json(
            &json!({
                "resourceType": "Patient",
                "id": "p1",
                "name": [
                    {"use": "official", "family": "Goldblum", "given": ["Jeff"]},
                    {"use": "usual", "given": ["J"]}
                ],
                "gender": "male",
                "birthDate": "1952-10-22",
                "deceasedBoolean": true,
                "extension": [
                    {"url": "http://example.org/birthPlace", "valueAddress": {"city": "Pittsburgh"}},
                    {"url": "http://example.org/nickname", "valueString": "Goldie"}
                ]
            }),
            &schema,
        )
        .unwrap()
    }

    fn eval_texts(doc: &Document, text: &str) -> Vec<String> {
        let expr = parse_expression(text).unwrap();
        evaluate(&expr, doc.root())
            .unwrap()
            .iter()
            .map(|item| item.text().unwrap_or_else(|| "<element>".to_string()))
            .collect()
    }

    #[test]
    fn test_navigation_and_where() {
        let doc = patient();
        assert_eq!(eval_texts(&doc, "Patient.gender"), vec!["male"]);
        assert_eq!(eval_texts(&doc, "Patient.name.given"), vec!["Jeff", "J"]);
        assert_eq!(
            eval_texts(&doc, "Patient.name.where(use = 'usual').given"),
            vec!["J"]
        );
        assert_eq!(eval_texts(&doc, "name.family"), vec!["Goldblum"]);
        assert!(eval_texts(&doc, "Observation.status").is_empty());
    }

    #[test]
    fn test_choice_and_cast() {
        let doc = patient();
        assert_eq!(eval_texts(&doc, "Patient.deceased"), vec!["true"]);
        assert_eq!(eval_texts(&doc, "(Patient.deceased as boolean) = true"), vec!["true"]);
        assert_eq!(eval_texts(&doc, "Patient.deceased is dateTime"), vec!["false"]);
    }

    #[test]
    fn test_extensions() {
        let doc = patient();
        assert_eq!(
            eval_texts(
                &doc,
                "Patient.extension.where(url = 'http://example.org/nickname').valueString"
            ),
            vec!["Goldie"]
        );
        assert_eq!(
            eval_texts(
                &doc,
                "Patient.extension('http://example.org/birthPlace').value.city"
            ),
            vec!["Pittsburgh"]
        );
    }

    #[test]
    fn test_functions_and_operators() {
        let doc = patient();
        assert_eq!(eval_texts(&doc, "Patient.name.count()"), vec!["2"]);
        assert_eq!(eval_texts(&doc, "Patient.name.first().use"), vec!["official"]);
        assert_eq!(eval_texts(&doc, "Patient.telecom.exists()"), vec!["false"]);
        assert_eq!(
            eval_texts(&doc, "Patient.name.family in ('Neill' | 'Dern' | 'Goldblum')"),
            vec!["true"]
        );
        assert_eq!(eval_texts(&doc, "Patient.birthDate < '1960'"), vec!["true"]);
        assert_eq!(
            eval_texts(&doc, "Patient.gender = 'male' and Patient.active.exists().not()"),
            vec!["true"]
        );
        assert_eq!(eval_texts(&doc, "Patient.name[1].use"), vec!["usual"]);
        assert_eq!(eval_texts(&doc, "1 + 2 * 3"), vec!["7"]);
        assert_eq!(eval_texts(&doc, "Patient.id & '-x'"), vec!["p1-x"]);
    }

    #[test]
    fn test_empty_comparisons_propagate() {
        let doc = patient();
        assert!(eval_texts(&doc, "Patient.active = true").is_empty());
    }

    #[test]
    fn test_unsupported_function() {
        let doc = patient();
        let expr = parse_expression("Patient.name.resolve()").unwrap();
        assert!(matches!(
            evaluate(&expr, doc.root()),
            Err(PathError::UnsupportedFunction { .. })
        ));
    }
}
