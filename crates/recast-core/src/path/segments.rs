//! Flat segment form of a path, as consumed by the mutation engine

use std::fmt;

use super::parser::{BinaryOp, Expr, Literal};
use crate::model::scalar_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateOp {
    Equals,
    NotEquals,
    /// Any other comparison; kept so the engine can warn instead of guessing
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `field` or `field[index]`
    Name { field: String, index: Option<usize> },
    /// `where(field = 'literal')`
    Predicate {
        field: String,
        op: PredicateOp,
        literal: String,
    },
    /// Anything the engine cannot build (functions, casts, arithmetic)
    Unsupported(String),
}

/// Ordering class of a path: equality predicates first, then not-equals, then plain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathClass {
    EqualsPredicate,
    NotEqualsPredicate,
    NoPredicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    pub segments: Vec<Segment>,
}

impl PathExpression {
    pub fn from_expr(expr: &Expr) -> Self {
        let mut segments = Vec::new();
        collect(expr, &mut segments);
        Self { segments }
    }

    /// Classified by the operator of the last predicate segment
    pub fn class(&self) -> PathClass {
        let last_predicate = self.segments.iter().rev().find_map(|segment| match segment {
            Segment::Predicate { op, .. } => Some(op),
            _ => None,
        });
        match last_predicate {
            Some(PredicateOp::Equals) => PathClass::EqualsPredicate,
            Some(PredicateOp::NotEquals) => PathClass::NotEqualsPredicate,
            _ => PathClass::NoPredicate,
        }
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match segment {
                Segment::Name {
                    field,
                    index: Some(index),
                } => write!(f, "{field}[{index}]")?,
                Segment::Name { field, index: None } => write!(f, "{field}")?,
                Segment::Predicate { field, op, literal } => {
                    let op = match op {
                        PredicateOp::Equals => "=",
                        PredicateOp::NotEquals => "!=",
                        PredicateOp::Unsupported(op) => op.as_str(),
                    };
                    write!(f, "where({field} {op} '{literal}')")?
                }
                Segment::Unsupported(text) => write!(f, "{text}")?,
            }
        }
        Ok(())
    }
}

fn collect(expr: &Expr, out: &mut Vec<Segment>) {
    match expr {
        Expr::Identifier(name) => out.push(Segment::Name {
            field: name.clone(),
            index: None,
        }),
        Expr::Member { target, name } => {
            collect(target, out);
            out.push(Segment::Name {
                field: name.clone(),
                index: None,
            });
        }
        Expr::Index { target, index } => {
            collect(target, out);
            let position = match index.as_ref() {
                Expr::Literal(Literal::Number(number)) => number.as_u64(),
                _ => None,
            };
            match (out.last_mut(), position) {
                (Some(Segment::Name { index, .. }), Some(position)) if index.is_none() => {
                    *index = usize::try_from(position).ok();
                }
                _ => out.push(Segment::Unsupported(format!("[{index:?}]"))),
            }
        }
        Expr::Call {
            target,
            name,
            args,
        } => {
            if let Some(target) = target {
                collect(target, out);
            }
            match (name.as_str(), args.as_slice()) {
                ("where", [criteria]) => out.push(predicate(criteria)),
                ("extension", [Expr::Literal(Literal::String(url))]) => {
                    out.push(Segment::Name {
                        field: "extension".to_string(),
                        index: None,
                    });
                    out.push(Segment::Predicate {
                        field: "url".to_string(),
                        op: PredicateOp::Equals,
                        literal: url.clone(),
                    });
                }
                _ => out.push(Segment::Unsupported(format!("{name}()"))),
            }
        }
        other => out.push(Segment::Unsupported(format!("{other:?}"))),
    }
}

fn predicate(criteria: &Expr) -> Segment {
    let Expr::Binary { op, lhs, rhs } = criteria else {
        return Segment::Unsupported(format!("where({criteria:?})"));
    };
    let (field, literal) = match (lhs.as_ref(), rhs.as_ref()) {
        (Expr::Identifier(field), Expr::Literal(literal))
        | (Expr::Literal(literal), Expr::Identifier(field)) => (field, literal),
        _ => return Segment::Unsupported(format!("where({criteria:?})")),
    };
    let literal = match literal {
        Literal::String(text) | Literal::DateTime(text) => text.clone(),
        Literal::Number(number) => scalar_text(number),
        Literal::Boolean(flag) => flag.to_string(),
    };
    let op = match op {
        BinaryOp::Equals => PredicateOp::Equals,
        BinaryOp::NotEquals => PredicateOp::NotEquals,
        other => PredicateOp::Unsupported(other.symbol().to_string()),
    };
    Segment::Predicate {
        field: field.clone(),
        op,
        literal,
    }
}
