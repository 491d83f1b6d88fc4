//! Tokenizer for path expressions

use super::PathError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Plain or backtick-delimited identifier; keywords are identifiers too
    Identifier(String),
    Str(String),
    Number(String),
    /// `@`-prefixed date/time literal, without the `@`
    DateTime(String),
    /// `%name`, without the `%`
    Variable(String),
    /// `$this` and friends, without the `$`
    Special(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    NotEq,
    Equiv,
    NotEquiv,
    Lt,
    Le,
    Gt,
    Ge,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, position: usize) -> Self {
        Self { kind, position }
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, PathError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let (position, current) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match current {
            c if c.is_whitespace() => {
                i += 1;
            }
            '.' => {
                tokens.push(Token::new(TokenKind::Dot, position));
                i += 1;
            }
            ',' => {
                tokens.push(Token::new(TokenKind::Comma, position));
                i += 1;
            }
            '(' => {
                tokens.push(Token::new(TokenKind::LParen, position));
                i += 1;
            }
            ')' => {
                tokens.push(Token::new(TokenKind::RParen, position));
                i += 1;
            }
            '[' => {
                tokens.push(Token::new(TokenKind::LBracket, position));
                i += 1;
            }
            ']' => {
                tokens.push(Token::new(TokenKind::RBracket, position));
                i += 1;
            }
            '|' => {
                tokens.push(Token::new(TokenKind::Pipe, position));
                i += 1;
            }
            '+' => {
                tokens.push(Token::new(TokenKind::Plus, position));
                i += 1;
            }
            '-' => {
                tokens.push(Token::new(TokenKind::Minus, position));
                i += 1;
            }
            '*' => {
                tokens.push(Token::new(TokenKind::Star, position));
                i += 1;
            }
            '/' => {
                tokens.push(Token::new(TokenKind::Slash, position));
                i += 1;
            }
            '&' => {
                tokens.push(Token::new(TokenKind::Amp, position));
                i += 1;
            }
            '=' => {
                tokens.push(Token::new(TokenKind::Eq, position));
                i += 1;
            }
            '~' => {
                tokens.push(Token::new(TokenKind::Equiv, position));
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::new(TokenKind::NotEq, position));
                i += 2;
            }
            '!' if next == Some('~') => {
                tokens.push(Token::new(TokenKind::NotEquiv, position));
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::new(TokenKind::Le, position));
                i += 2;
            }
            '<' => {
                tokens.push(Token::new(TokenKind::Lt, position));
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::new(TokenKind::Ge, position));
                i += 2;
            }
            '>' => {
                tokens.push(Token::new(TokenKind::Gt, position));
                i += 1;
            }
            '\'' | '"' => {
                let (text, end) = lex_quoted(&chars, i, current)?;
                tokens.push(Token::new(TokenKind::Str(text), position));
                i = end;
            }
            '`' => {
                let (text, end) = lex_quoted(&chars, i, '`')?;
                tokens.push(Token::new(TokenKind::Identifier(text), position));
                i = end;
            }
            '%' => {
                let (name, end) = match next {
                    Some(quote @ ('`' | '\'' | '"')) => lex_quoted(&chars, i + 1, quote)?,
                    _ => lex_identifier(&chars, i + 1),
                };
                if name.is_empty() {
                    return Err(PathError::syntax("expected variable name after '%'", position));
                }
                tokens.push(Token::new(TokenKind::Variable(name), position));
                i = end;
            }
            '$' => {
                let (name, end) = lex_identifier(&chars, i + 1);
                if name.is_empty() {
                    return Err(PathError::syntax("expected name after '$'", position));
                }
                tokens.push(Token::new(TokenKind::Special(name), position));
                i = end;
            }
            '@' => {
                let mut end = i + 1;
                while end < chars.len() && is_datetime_char(chars[end].1) {
                    end += 1;
                }
                let text: String = chars[i + 1..end].iter().map(|(_, c)| c).collect();
                tokens.push(Token::new(TokenKind::DateTime(text), position));
                i = end;
            }
            c if c.is_ascii_digit() => {
                let mut end = i;
                while end < chars.len() && chars[end].1.is_ascii_digit() {
                    end += 1;
                }
                // A fraction needs a digit after the dot, otherwise the dot is an invocation
                if end + 1 < chars.len() && chars[end].1 == '.' && chars[end + 1].1.is_ascii_digit() {
                    end += 1;
                    while end < chars.len() && chars[end].1.is_ascii_digit() {
                        end += 1;
                    }
                }
                let text: String = chars[i..end].iter().map(|(_, c)| c).collect();
                tokens.push(Token::new(TokenKind::Number(text), position));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let (name, end) = lex_identifier(&chars, i);
                tokens.push(Token::new(TokenKind::Identifier(name), position));
                i = end;
            }
            other => {
                return Err(PathError::UnexpectedCharacter {
                    ch: other,
                    position,
                });
            }
        }
    }

    tokens.push(Token::new(TokenKind::Eof, input.len()));
    Ok(tokens)
}

fn lex_identifier(chars: &[(usize, char)], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && (chars[end].1.is_alphanumeric() || chars[end].1 == '_') {
        end += 1;
    }
    (chars[start..end].iter().map(|(_, c)| c).collect(), end)
}

fn lex_quoted(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> Result<(String, usize), PathError> {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((text, i + 1));
        }
        if c == '\\' {
            let Some((_, escaped)) = chars.get(i + 1) else {
                break;
            };
            match escaped {
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                'f' => text.push('\u{000C}'),
                'u' => {
                    let hex: String = chars
                        .get(i + 2..i + 6)
                        .map(|run| run.iter().map(|(_, c)| c).collect())
                        .unwrap_or_default();
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(decoded) => text.push(decoded),
                        None => {
                            return Err(PathError::syntax(
                                "invalid unicode escape",
                                chars[i].0,
                            ));
                        }
                    }
                    i += 6;
                    continue;
                }
                other => text.push(*other),
            }
            i += 2;
            continue;
        }
        text.push(c);
        i += 1;
    }
    Err(PathError::UnterminatedString {
        position: chars[start].0,
    })
}

fn is_datetime_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '-' | ':' | 'T' | '.' | '+' | 'Z')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_dotted_path_with_predicate() {
        assert_eq!(
            kinds("Patient.name.where(use = 'official')"),
            vec![
                TokenKind::Identifier("Patient".into()),
                TokenKind::Dot,
                TokenKind::Identifier("name".into()),
                TokenKind::Dot,
                TokenKind::Identifier("where".into()),
                TokenKind::LParen,
                TokenKind::Identifier("use".into()),
                TokenKind::Eq,
                TokenKind::Str("official".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_and_literals() {
        assert_eq!(
            kinds("a != 1.5 and b <= @2020-01-01 | %vars"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::NotEq,
                TokenKind::Number("1.5".into()),
                TokenKind::Identifier("and".into()),
                TokenKind::Identifier("b".into()),
                TokenKind::Le,
                TokenKind::DateTime("2020-01-01".into()),
                TokenKind::Pipe,
                TokenKind::Variable("vars".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_index_after_number_is_not_a_fraction() {
        assert_eq!(
            kinds("given[0].length"),
            vec![
                TokenKind::Identifier("given".into()),
                TokenKind::LBracket,
                TokenKind::Number("0".into()),
                TokenKind::RBracket,
                TokenKind::Dot,
                TokenKind::Identifier("length".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_escapes_and_unterminated_strings() {
        assert_eq!(kinds(r"'it\'s'")[0], TokenKind::Str("it's".into()));
        assert!(matches!(
            tokenize("'open"),
            Err(PathError::UnterminatedString { position: 0 })
        ));
        assert!(matches!(
            tokenize("a # b"),
            Err(PathError::UnexpectedCharacter { ch: '#', .. })
        ));
    }
}
