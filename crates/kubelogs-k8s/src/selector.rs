//! Label selector parsing
//!
//! Validates label queries using the Kubernetes selector grammar before they
//! are sent to the API server, so a typo fails loudly instead of matching
//! nothing (or everything).

use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};
use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a label name or value
const MAX_NAME_LEN: usize = 63;

/// Maximum length of a key prefix (DNS subdomain)
const MAX_PREFIX_LEN: usize = 253;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap());

static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// Errors produced while resolving a label selector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("label selector is empty")]
    Empty,

    #[error("unexpected {found} at position {position}, expected {expected}")]
    Unexpected {
        position: usize,
        found: String,
        expected: &'static str,
    },

    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid label value {value:?} for key {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("operator '{operator}' on key {key:?} needs at least one value")]
    EmptyValueSet { key: String, operator: Operator },

    #[error("operator '{operator}' on key {key:?} needs an integer value, got {value:?}")]
    NotAnInteger {
        key: String,
        operator: Operator,
        value: String,
    },
}

/// Comparison applied by a single requirement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    LessThan,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exists => "exists",
            Self::DoesNotExist => "!",
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
        };
        f.write_str(s)
    }
}

/// One clause of a label selector, e.g. `tier in (web,api)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals | Operator::NotEquals | Operator::GreaterThan | Operator::LessThan => {
                let value = self.values.first().map(String::as_str).unwrap_or_default();
                write!(f, "{}{}{}", self.key, self.operator, value)
            }
            Operator::In | Operator::NotIn => {
                write!(f, "{} {} ({})", self.key, self.operator, self.values.join(","))
            }
        }
    }
}

/// A validated, immutable label selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse and validate a label query.
    ///
    /// Requirements are sorted by key and set values are sorted and
    /// deduplicated, so the `Display` form is canonical: parsing it again
    /// yields an equal selector.
    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        if raw.trim().is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut parser = Parser::new(raw);
        let mut requirements = Vec::new();

        loop {
            requirements.push(parser.requirement()?);
            match parser.next() {
                (_, Token::Comma) => continue,
                (_, Token::End) => break,
                (position, other) => {
                    return Err(SelectorError::Unexpected {
                        position,
                        found: other.to_string(),
                        expected: "',' or end of selector",
                    });
                }
            }
        }

        requirements.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Bang,
    Eq,
    DoubleEq,
    NotEq,
    Gt,
    Lt,
    In,
    NotIn,
    Comma,
    OpenParen,
    CloseParen,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier {:?}", s),
            Self::Bang => f.write_str("'!'"),
            Self::Eq => f.write_str("'='"),
            Self::DoubleEq => f.write_str("'=='"),
            Self::NotEq => f.write_str("'!='"),
            Self::Gt => f.write_str("'>'"),
            Self::Lt => f.write_str("'<'"),
            Self::In => f.write_str("'in'"),
            Self::NotIn => f.write_str("'notin'"),
            Self::Comma => f.write_str("','"),
            Self::OpenParen => f.write_str("'('"),
            Self::CloseParen => f.write_str("')'"),
            Self::End => f.write_str("end of selector"),
        }
    }
}

fn is_special(c: char) -> bool {
    c.is_whitespace() || matches!(c, '!' | '=' | ',' | '(' | ')' | '<' | '>')
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, want: char) -> bool {
    if chars.peek().map(|&(_, c)| c) == Some(want) {
        chars.next();
        true
    } else {
        false
    }
}

fn tokenize(input: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '!' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '=' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    Token::DoubleEq
                } else {
                    Token::Eq
                }
            }
            ',' | '(' | ')' | '<' | '>' => {
                chars.next();
                match c {
                    ',' => Token::Comma,
                    '(' => Token::OpenParen,
                    ')' => Token::CloseParen,
                    '<' => Token::Lt,
                    _ => Token::Gt,
                }
            }
            _ => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if is_special(c) {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                match ident.as_str() {
                    "in" => Token::In,
                    "notin" => Token::NotIn,
                    _ => Token::Ident(ident),
                }
            }
        };
        tokens.push((position, token));
    }

    tokens.push((input.len(), Token::End));
    tokens
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            tokens: tokenize(input),
            cursor: 0,
        }
    }

    fn peek(&self) -> &Token {
        // tokenize always ends with Token::End
        &self.tokens[self.cursor.min(self.tokens.len() - 1)].1
    }

    fn next(&mut self) -> (usize, Token) {
        let idx = self.cursor.min(self.tokens.len() - 1);
        self.cursor += 1;
        self.tokens[idx].clone()
    }

    fn requirement(&mut self) -> Result<Requirement, SelectorError> {
        let (position, token) = self.next();
        let (key, negated) = match token {
            Token::Bang => match self.next() {
                (_, Token::Ident(key)) => (key, true),
                (position, other) => {
                    return Err(SelectorError::Unexpected {
                        position,
                        found: other.to_string(),
                        expected: "label key after '!'",
                    });
                }
            },
            Token::Ident(key) => (key, false),
            other => {
                return Err(SelectorError::Unexpected {
                    position,
                    found: other.to_string(),
                    expected: "label key",
                });
            }
        };
        validate_key(&key)?;

        if negated {
            return Ok(Requirement {
                key,
                operator: Operator::DoesNotExist,
                values: Vec::new(),
            });
        }

        let operator = match self.peek() {
            Token::Comma | Token::End => {
                return Ok(Requirement {
                    key,
                    operator: Operator::Exists,
                    values: Vec::new(),
                });
            }
            Token::Eq | Token::DoubleEq => Operator::Equals,
            Token::NotEq => Operator::NotEquals,
            Token::In => Operator::In,
            Token::NotIn => Operator::NotIn,
            Token::Gt => Operator::GreaterThan,
            Token::Lt => Operator::LessThan,
            _ => {
                let (position, other) = self.next();
                return Err(SelectorError::Unexpected {
                    position,
                    found: other.to_string(),
                    expected: "operator",
                });
            }
        };
        self.next();

        let values = match operator {
            Operator::In | Operator::NotIn => {
                let mut values = self.value_set(&key)?;
                if values.is_empty() {
                    return Err(SelectorError::EmptyValueSet { key, operator });
                }
                values.sort();
                values.dedup();
                values
            }
            Operator::GreaterThan | Operator::LessThan => {
                let value = self.value(&key)?;
                if value.parse::<i64>().is_err() {
                    return Err(SelectorError::NotAnInteger {
                        key,
                        operator,
                        value,
                    });
                }
                vec![value]
            }
            _ => vec![self.value(&key)?],
        };

        Ok(Requirement {
            key,
            operator,
            values,
        })
    }

    /// A single value; an absent value (`key=`) is the empty string
    fn value(&mut self, key: &str) -> Result<String, SelectorError> {
        let value = match self.peek() {
            Token::Ident(v) => v.clone(),
            Token::In => "in".to_string(),
            Token::NotIn => "notin".to_string(),
            Token::Comma | Token::End | Token::CloseParen => return Ok(String::new()),
            _ => {
                let (position, other) = self.next();
                return Err(SelectorError::Unexpected {
                    position,
                    found: other.to_string(),
                    expected: "label value",
                });
            }
        };
        self.next();
        validate_value(key, &value)?;
        Ok(value)
    }

    fn value_set(&mut self, key: &str) -> Result<Vec<String>, SelectorError> {
        match self.next() {
            (_, Token::OpenParen) => {}
            (position, other) => {
                return Err(SelectorError::Unexpected {
                    position,
                    found: other.to_string(),
                    expected: "'('",
                });
            }
        }

        let mut values = Vec::new();
        if *self.peek() == Token::CloseParen {
            self.next();
            return Ok(values);
        }

        loop {
            values.push(self.value(key)?);
            match self.next() {
                (_, Token::Comma) => continue,
                (_, Token::CloseParen) => break,
                (position, other) => {
                    return Err(SelectorError::Unexpected {
                        position,
                        found: other.to_string(),
                        expected: "',' or ')'",
                    });
                }
            }
        }

        Ok(values)
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name part must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("must be no more than {} characters", MAX_NAME_LEN));
    }
    if !NAME_RE.is_match(name) {
        return Err(
            "must consist of alphanumerics, '-', '_' or '.', starting and ending alphanumeric"
                .to_string(),
        );
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason: String| SelectorError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() {
                return Err(invalid("prefix part must not be empty".to_string()));
            }
            if prefix.len() > MAX_PREFIX_LEN {
                return Err(invalid(format!(
                    "prefix part must be no more than {} characters",
                    MAX_PREFIX_LEN
                )));
            }
            if !PREFIX_RE.is_match(prefix) {
                return Err(invalid(
                    "prefix part must be a lowercase DNS subdomain".to_string(),
                ));
            }
            name
        }
        None => key,
    };

    validate_name(name).map_err(invalid)
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }
    validate_name(value).map_err(|reason| SelectorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}
