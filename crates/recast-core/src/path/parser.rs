//! Pratt parser producing the expression tree

use serde_json::Value as JsonValue;

use super::PathError;
use super::lexer::{Token, TokenKind, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(JsonValue),
    Boolean(bool),
    DateTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Implies,
    Or,
    Xor,
    And,
    In,
    Contains,
    Equals,
    NotEquals,
    Equivalent,
    NotEquivalent,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Union,
    Add,
    Subtract,
    Concat,
    Multiply,
    Divide,
    Div,
    Mod,
}

impl BinaryOp {
    /// Binding power; higher binds tighter
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Implies => 1,
            BinaryOp::Or | BinaryOp::Xor => 2,
            BinaryOp::And => 3,
            BinaryOp::In | BinaryOp::Contains => 4,
            BinaryOp::Equals
            | BinaryOp::NotEquals
            | BinaryOp::Equivalent
            | BinaryOp::NotEquivalent => 5,
            BinaryOp::Less
            | BinaryOp::LessOrEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterOrEqual => 6,
            BinaryOp::Union => 7,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Concat => 9,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Implies => "implies",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::And => "and",
            BinaryOp::In => "in",
            BinaryOp::Contains => "contains",
            BinaryOp::Equals => "=",
            BinaryOp::NotEquals => "!=",
            BinaryOp::Equivalent => "~",
            BinaryOp::NotEquivalent => "!~",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::Union => "|",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Concat => "&",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        }
    }
}

const TYPE_OP_PRECEDENCE: u8 = 8;
const UNARY_PRECEDENCE: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOp {
    Is,
    As,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Identifier invoked on the current focus
    Identifier(String),
    Variable(String),
    This,
    Member {
        target: Box<Expr>,
        name: String,
    },
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    TypeTest {
        op: TypeOp,
        operand: Box<Expr>,
        type_name: String,
    },
}

pub fn parse_expression(input: &str) -> Result<Expr, PathError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression(0)?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        other => Err(PathError::syntax(
            format!("unexpected token {other:?}"),
            parser.position(),
        )),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.position).unwrap_or(0)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), PathError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(PathError::syntax(
                format!("expected {expected:?}, found {:?}", self.peek()),
                self.position(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, PathError> {
        match self.advance() {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(PathError::syntax(
                format!("expected identifier, found {other:?}"),
                self.position(),
            )),
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, PathError> {
        let mut lhs = self.prefix()?;

        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    lhs = if *self.peek() == TokenKind::LParen {
                        let args = self.arguments()?;
                        Expr::Call {
                            target: Some(Box::new(lhs)),
                            name,
                            args,
                        }
                    } else {
                        Expr::Member {
                            target: Box::new(lhs),
                            name,
                        }
                    };
                    continue;
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression(0)?;
                    self.expect(TokenKind::RBracket)?;
                    lhs = Expr::Index {
                        target: Box::new(lhs),
                        index: Box::new(index),
                    };
                    continue;
                }
                _ => {}
            }

            if let Some(op) = self.type_operator() {
                if TYPE_OP_PRECEDENCE <= min_precedence {
                    break;
                }
                self.advance();
                let type_name = self.type_specifier()?;
                lhs = Expr::TypeTest {
                    op,
                    operand: Box::new(lhs),
                    type_name,
                };
                continue;
            }

            let Some(op) = self.binary_operator() else {
                break;
            };
            // Left associative: stop at equal precedence
            if op.precedence() <= min_precedence {
                break;
            }
            self.advance();
            let rhs = self.expression(op.precedence())?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, PathError> {
        let position = self.position();
        match self.advance() {
            TokenKind::Identifier(name) => {
                if name == "true" || name == "false" {
                    Ok(Expr::Literal(Literal::Boolean(name == "true")))
                } else if *self.peek() == TokenKind::LParen {
                    let args = self.arguments()?;
                    Ok(Expr::Call {
                        target: None,
                        name,
                        args,
                    })
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            TokenKind::Str(text) => Ok(Expr::Literal(Literal::String(text))),
            TokenKind::Number(text) => text
                .parse::<serde_json::Number>()
                .map(|n| Expr::Literal(Literal::Number(JsonValue::Number(n))))
                .map_err(|_| PathError::syntax(format!("invalid number '{text}'"), position)),
            TokenKind::DateTime(text) => Ok(Expr::Literal(Literal::DateTime(text))),
            TokenKind::Variable(name) => Ok(Expr::Variable(name)),
            TokenKind::Special(name) if name == "this" => Ok(Expr::This),
            TokenKind::Special(name) => Err(PathError::Unsupported {
                construct: format!("${name}"),
            }),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Minus => {
                let operand = self.expression(UNARY_PRECEDENCE)?;
                Ok(Expr::Negate(Box::new(operand)))
            }
            TokenKind::Plus => self.expression(UNARY_PRECEDENCE),
            other => Err(PathError::syntax(
                format!("unexpected token {other:?}"),
                position,
            )),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, PathError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if *self.peek() == TokenKind::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.advance() {
                TokenKind::Comma => continue,
                TokenKind::RParen => break,
                other => {
                    return Err(PathError::syntax(
                        format!("expected ',' or ')', found {other:?}"),
                        self.position(),
                    ));
                }
            }
        }
        Ok(args)
    }

    /// `Patient`, `FHIR.Patient` or `System.String`
    fn type_specifier(&mut self) -> Result<String, PathError> {
        let mut name = self.expect_identifier()?;
        while *self.peek() == TokenKind::Dot {
            self.advance();
            name = self.expect_identifier()?;
        }
        Ok(name)
    }

    fn type_operator(&self) -> Option<TypeOp> {
        match self.peek() {
            TokenKind::Identifier(word) if word == "is" => Some(TypeOp::Is),
            TokenKind::Identifier(word) if word == "as" => Some(TypeOp::As),
            _ => None,
        }
    }

    fn binary_operator(&self) -> Option<BinaryOp> {
        let op = match self.peek() {
            TokenKind::Eq => BinaryOp::Equals,
            TokenKind::NotEq => BinaryOp::NotEquals,
            TokenKind::Equiv => BinaryOp::Equivalent,
            TokenKind::NotEquiv => BinaryOp::NotEquivalent,
            TokenKind::Lt => BinaryOp::Less,
            TokenKind::Le => BinaryOp::LessOrEqual,
            TokenKind::Gt => BinaryOp::Greater,
            TokenKind::Ge => BinaryOp::GreaterOrEqual,
            TokenKind::Pipe => BinaryOp::Union,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Amp => BinaryOp::Concat,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Identifier(word) => match word.as_str() {
                "and" => BinaryOp::And,
                "or" => BinaryOp::Or,
                "xor" => BinaryOp::Xor,
                "implies" => BinaryOp::Implies,
                "in" => BinaryOp::In,
                "contains" => BinaryOp::Contains,
                "div" => BinaryOp::Div,
                "mod" => BinaryOp::Mod,
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Identifier(name.to_string()))
    }

    fn string(text: &str) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::String(text.to_string())))
    }

    #[test]
    fn test_member_chain_with_where() {
        let expr = parse_expression("Patient.name.where(use = 'official').given").unwrap();
        let expected = Expr::Member {
            target: Box::new(Expr::Call {
                target: Some(Box::new(Expr::Member {
                    target: ident("Patient"),
                    name: "name".into(),
                })),
                name: "where".into(),
                args: vec![Expr::Binary {
                    op: BinaryOp::Equals,
                    lhs: ident("use"),
                    rhs: string("official"),
                }],
            }),
            name: "given".into(),
        };
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_precedence_of_and_over_or() {
        let expr = parse_expression("a or b and c").unwrap();
        let Expr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_in_with_parenthesized_union() {
        let expr = parse_expression("Patient.name.family in ('Neill' | 'Dern')").unwrap();
        let Expr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::In);
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Union, .. }));
    }

    #[test]
    fn test_type_cast_binds_tighter_than_equality() {
        let expr = parse_expression("(Patient.deceased as boolean) = true").unwrap();
        let Expr::Binary { op, lhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Equals);
        assert!(matches!(*lhs, Expr::TypeTest { op: TypeOp::As, .. }));

        let expr = parse_expression("value is FHIR.Quantity").unwrap();
        assert!(matches!(
            expr,
            Expr::TypeTest { op: TypeOp::Is, ref type_name, .. } if type_name == "Quantity"
        ));
    }

    #[test]
    fn test_indexer() {
        let expr = parse_expression("name.given[1]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expression("name.").is_err());
        assert!(parse_expression("where(use = 'x'").is_err());
        assert!(parse_expression("a b").is_err());
    }
}
