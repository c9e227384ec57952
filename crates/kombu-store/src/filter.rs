//! Metadata filters: a conjunction of `key op value` predicates.
//!
//! Grammar for the textual form:
//!
//! ```text
//! filter    := predicate ( "and" predicate )*
//! predicate := key op value
//! op        := "==" | "!=" | "<" | "<=" | ">" | ">=" | "in"
//! value     := string | number | bool | "[" value ("," value)* "]"
//! ```
//!
//! Example: `lang == "en" and year >= 2020 and tag in ["a", "b"]`
//!
//! Semantics: a predicate referencing a missing key evaluates false (even
//! `!=`), as does a comparison between incompatible types. Int and Float
//! coerce to each other for every operator; `in` matches any listed value.

use crate::model::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Comparison operators supported by predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
        }
    }
}

/// The right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Scalar(MetadataValue),
    List(Vec<MetadataValue>),
}

/// One `key op value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub op: CompareOp,
    pub value: FilterValue,
}

impl Predicate {
    pub fn new(key: impl Into<String>, op: CompareOp, value: FilterValue) -> Self {
        Self {
            key: key.into(),
            op,
            value,
        }
    }

    /// Evaluate against a metadata map. Missing keys and incompatible
    /// types evaluate false.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let Some(actual) = metadata.get(&self.key) else {
            return false;
        };

        match (&self.op, &self.value) {
            (CompareOp::In, FilterValue::List(values)) => {
                values.iter().any(|v| compare(actual, v) == Some(Ordering::Equal))
            }
            (CompareOp::In, FilterValue::Scalar(value)) => {
                compare(actual, value) == Some(Ordering::Equal)
            }
            (op, FilterValue::Scalar(value)) => match compare(actual, value) {
                Some(ordering) => match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                    CompareOp::In => unreachable!("handled above"),
                },
                None => false,
            },
            // A list only makes sense with `in`.
            (_, FilterValue::List(_)) => false,
        }
    }
}

/// Order two metadata values, coercing Int and Float to each other.
/// Incompatible types return `None`.
fn compare(a: &MetadataValue, b: &MetadataValue) -> Option<Ordering> {
    use MetadataValue::*;
    match (a, b) {
        (Str(a), Str(b)) => Some(a.cmp(b)),
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (Int(a), Int(b)) => Some(a.cmp(b)),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
        _ => None,
    }
}

/// A conjunction of predicates; empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.predicates.iter().all(|p| p.matches(metadata))
    }

    /// Parse the textual form.
    pub fn parse(input: &str) -> std::result::Result<Self, FilterParseError> {
        Parser::new(input).parse()
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{} {} ", p.key, p.op.symbol())?;
            fmt_value(f, &p.value)?;
        }
        Ok(())
    }
}

fn fmt_value(f: &mut std::fmt::Formatter<'_>, value: &FilterValue) -> std::fmt::Result {
    match value {
        FilterValue::Scalar(v) => fmt_scalar(f, v),
        FilterValue::List(values) => {
            f.write_str("[")?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                fmt_scalar(f, v)?;
            }
            f.write_str("]")
        }
    }
}

fn fmt_scalar(f: &mut std::fmt::Formatter<'_>, value: &MetadataValue) -> std::fmt::Result {
    match value {
        MetadataValue::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        MetadataValue::Int(i) => write!(f, "{}", i),
        MetadataValue::Float(x) => write!(f, "{:?}", x),
        MetadataValue::Bool(b) => write!(f, "{}", b),
    }
}

/// Error from [`Filter::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("filter parse error at offset {offset}: {message}")]
pub struct FilterParseError {
    pub offset: usize,
    pub message: String,
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> std::result::Result<Filter, FilterParseError> {
        let mut predicates = Vec::new();

        self.skip_ws();
        if self.at_end() {
            return Ok(Filter::new(predicates));
        }

        loop {
            predicates.push(self.predicate()?);
            self.skip_ws();
            if self.at_end() {
                break;
            }
            let word = self.ident()?;
            if word != "and" {
                return Err(self.error(format!("expected 'and', got '{}'", word)));
            }
        }

        Ok(Filter::new(predicates))
    }

    fn predicate(&mut self) -> std::result::Result<Predicate, FilterParseError> {
        self.skip_ws();
        let key = self.ident()?;
        let op = self.op()?;

        self.skip_ws();
        let value = if op == CompareOp::In {
            FilterValue::List(self.list()?)
        } else {
            FilterValue::Scalar(self.scalar()?)
        };

        Ok(Predicate::new(key, op, value))
    }

    fn op(&mut self) -> std::result::Result<CompareOp, FilterParseError> {
        self.skip_ws();
        let rest: String = self.chars[self.pos..].iter().take(2).collect();

        let (op, len) = if rest.starts_with("==") {
            (CompareOp::Eq, 2)
        } else if rest.starts_with("!=") {
            (CompareOp::Ne, 2)
        } else if rest.starts_with("<=") {
            (CompareOp::Le, 2)
        } else if rest.starts_with(">=") {
            (CompareOp::Ge, 2)
        } else if rest.starts_with('<') {
            (CompareOp::Lt, 1)
        } else if rest.starts_with('>') {
            (CompareOp::Gt, 1)
        } else if rest.starts_with("in")
            && self
                .chars
                .get(self.pos + 2)
                .map(|c| !c.is_alphanumeric() && *c != '_')
                .unwrap_or(true)
        {
            (CompareOp::In, 2)
        } else {
            return Err(self.error("expected an operator (==, !=, <, <=, >, >=, in)".to_string()));
        };

        self.pos += len;
        Ok(op)
    }

    fn list(&mut self) -> std::result::Result<Vec<MetadataValue>, FilterParseError> {
        if !self.eat('[') {
            return Err(self.error("expected '[' after 'in'".to_string()));
        }

        let mut values = Vec::new();
        self.skip_ws();
        if self.eat(']') {
            return Ok(values);
        }

        loop {
            values.push(self.scalar()?);
            self.skip_ws();
            if self.eat(']') {
                break;
            }
            if !self.eat(',') {
                return Err(self.error("expected ',' or ']' in list".to_string()));
            }
        }
        Ok(values)
    }

    fn scalar(&mut self) -> std::result::Result<MetadataValue, FilterParseError> {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.string(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.number(),
            Some(c) if c.is_alphabetic() => {
                let word = self.ident()?;
                match word.as_str() {
                    "true" => Ok(MetadataValue::Bool(true)),
                    "false" => Ok(MetadataValue::Bool(false)),
                    other => Err(self.error(format!(
                        "unexpected bare word '{}' (strings must be quoted)",
                        other
                    ))),
                }
            }
            _ => Err(self.error("expected a value".to_string())),
        }
    }

    fn string(&mut self) -> std::result::Result<MetadataValue, FilterParseError> {
        self.eat('"');
        let mut out = String::new();
        loop {
            match self.next() {
                Some('"') => return Ok(MetadataValue::Str(out)),
                Some('\\') => match self.next() {
                    Some(c @ ('"' | '\\')) => out.push(c),
                    Some(c) => return Err(self.error(format!("unknown escape '\\{}'", c))),
                    None => return Err(self.error("unterminated string".to_string())),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string".to_string())),
            }
        }
    }

    fn number(&mut self) -> std::result::Result<MetadataValue, FilterParseError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(MetadataValue::Float)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(MetadataValue::Int)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        }
    }

    fn ident(&mut self) -> std::result::Result<String, FilterParseError> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || (self.pos > start && c == '-') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected an identifier".to_string()));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: String) -> FilterParseError {
        // Byte offset is close enough for ASCII-heavy filters; fall back
        // to the char position otherwise.
        let offset = self
            .input
            .char_indices()
            .nth(self.pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len());
        FilterParseError { offset, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_single_predicate() {
        let filter = Filter::parse("lang == \"en\"").unwrap();
        assert_eq!(filter.predicates.len(), 1);
        assert_eq!(filter.predicates[0].key, "lang");
        assert_eq!(filter.predicates[0].op, CompareOp::Eq);
        assert_eq!(
            filter.predicates[0].value,
            FilterValue::Scalar(MetadataValue::Str("en".to_string()))
        );
    }

    #[test]
    fn test_parse_conjunction() {
        let filter = Filter::parse("lang == \"en\" and year >= 2020 and draft != true").unwrap();
        assert_eq!(filter.predicates.len(), 3);
        assert_eq!(filter.predicates[1].op, CompareOp::Ge);
        assert_eq!(
            filter.predicates[1].value,
            FilterValue::Scalar(MetadataValue::Int(2020))
        );
    }

    #[test]
    fn test_parse_in_list() {
        let filter = Filter::parse("tag in [\"a\", \"b\", 3]").unwrap();
        assert_eq!(
            filter.predicates[0].value,
            FilterValue::List(vec![
                MetadataValue::Str("a".to_string()),
                MetadataValue::Str("b".to_string()),
                MetadataValue::Int(3),
            ])
        );
    }

    #[test]
    fn test_parse_numbers() {
        let filter = Filter::parse("score > -1.5 and count < 10").unwrap();
        assert_eq!(
            filter.predicates[0].value,
            FilterValue::Scalar(MetadataValue::Float(-1.5))
        );
        assert_eq!(
            filter.predicates[1].value,
            FilterValue::Scalar(MetadataValue::Int(10))
        );
    }

    #[test]
    fn test_parse_empty_is_match_all() {
        let filter = Filter::parse("   ").unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&Metadata::new()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Filter::parse("lang ==").is_err());
        assert!(Filter::parse("lang = \"en\"").is_err());
        assert!(Filter::parse("lang == en").is_err());
        assert!(Filter::parse("lang == \"en\" or x == 1").is_err());
        assert!(Filter::parse("tag in \"a\"").is_err());
        assert!(Filter::parse("lang == \"unterminated").is_err());
    }

    #[test]
    fn test_matches_equality() {
        let metadata = meta(&[("lang", "en".into()), ("year", 2024i64.into())]);

        assert!(Filter::parse("lang == \"en\"").unwrap().matches(&metadata));
        assert!(!Filter::parse("lang == \"fr\"").unwrap().matches(&metadata));
        assert!(Filter::parse("lang != \"fr\"").unwrap().matches(&metadata));
    }

    #[test]
    fn test_missing_key_is_false() {
        let metadata = meta(&[("lang", "en".into())]);

        assert!(!Filter::parse("missing == \"x\"").unwrap().matches(&metadata));
        // Even negative predicates are false on a missing key.
        assert!(!Filter::parse("missing != \"x\"").unwrap().matches(&metadata));
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let metadata = meta(&[("year", 2024i64.into())]);
        assert!(!Filter::parse("year == \"2024\"").unwrap().matches(&metadata));
        assert!(!Filter::parse("year != \"2024\"").unwrap().matches(&metadata));
    }

    #[test]
    fn test_numeric_coercion() {
        let metadata = meta(&[("score", 2.5f64.into()), ("count", 3i64.into())]);

        assert!(Filter::parse("score > 2").unwrap().matches(&metadata));
        assert!(Filter::parse("count <= 3.0").unwrap().matches(&metadata));
        assert!(!Filter::parse("count > 3").unwrap().matches(&metadata));
    }

    #[test]
    fn test_range_conjunction() {
        let metadata = meta(&[("year", 2022i64.into())]);
        let filter = Filter::parse("year >= 2020 and year < 2024").unwrap();
        assert!(filter.matches(&metadata));

        let outside = meta(&[("year", 2024i64.into())]);
        assert!(!filter.matches(&outside));
    }

    #[test]
    fn test_in_operator() {
        let metadata = meta(&[("tag", "rust".into())]);
        assert!(Filter::parse("tag in [\"go\", \"rust\"]").unwrap().matches(&metadata));
        assert!(!Filter::parse("tag in [\"go\", \"zig\"]").unwrap().matches(&metadata));
        assert!(!Filter::parse("tag in []").unwrap().matches(&metadata));
    }

    #[test]
    fn test_string_escapes() {
        let filter = Filter::parse("name == \"a \\\"quoted\\\" word\"").unwrap();
        let metadata = meta(&[("name", "a \"quoted\" word".into())]);
        assert!(filter.matches(&metadata));
    }

    #[test]
    fn test_display_round_trip() {
        let source = "lang == \"en\" and year >= 2020 and tag in [\"a\", \"b\"]";
        let filter = Filter::parse(source).unwrap();
        let reparsed = Filter::parse(&filter.to_string()).unwrap();
        assert_eq!(filter, reparsed);
    }
}
