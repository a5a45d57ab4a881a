//! Predicate expressions
//!
//! Selector bodies are parsed into an AST and evaluated against a single
//! bound subject, `it` (the candidate node's indexed value). Evaluation is
//! pure: no assignments, no calls, no access to anything but `it`.
//!
//! ```text
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | cmp
//! cmp     := primary (("==" | "!=" | "<" | "<=" | ">" | ">=" | "~") primary)?
//! primary := "it" | number | string | "true" | "false" | "null" | "(" or ")"
//! ```
//!
//! `~` matches the left side against a regex given as a string literal.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::value::{compare_values, values_equal};

use super::errors::{TreeError, TreeResult};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }
}

/// Expression AST
#[derive(Debug, Clone)]
pub enum Expr {
    /// The bound subject
    Subject,
    /// A JSON literal
    Literal(Value),
    /// Logical negation
    Not(Box<Expr>),
    /// Short-circuit AND
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit OR
    Or(Box<Expr>, Box<Expr>),
    /// Binary comparison
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// Regex match of a string operand
    Matches(Box<Expr>, Regex),
}

impl Expr {
    /// Parse a predicate body
    pub fn parse(source: &str) -> TreeResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some((offset, token)) = parser.peek_spanned() {
            return Err(TreeError::expression(offset, format!("unexpected token {}", token)));
        }
        Ok(expr)
    }

    /// Evaluate with `it` bound to `subject`
    pub fn evaluate(&self, subject: &Value) -> Value {
        match self {
            Expr::Subject => subject.clone(),
            Expr::Literal(v) => v.clone(),
            Expr::Not(inner) => Value::Bool(!truthy(&inner.evaluate(subject))),
            Expr::And(l, r) => {
                Value::Bool(truthy(&l.evaluate(subject)) && truthy(&r.evaluate(subject)))
            }
            Expr::Or(l, r) => {
                Value::Bool(truthy(&l.evaluate(subject)) || truthy(&r.evaluate(subject)))
            }
            Expr::Compare(op, l, r) => {
                Value::Bool(compare(*op, &l.evaluate(subject), &r.evaluate(subject)))
            }
            Expr::Matches(operand, re) => match operand.evaluate(subject) {
                Value::String(s) => Value::Bool(re.is_match(&s)),
                _ => Value::Bool(false),
            },
        }
    }

    /// Whether the predicate keeps this subject (only `true` keeps)
    pub fn test(&self, subject: &Value) -> bool {
        matches!(self.evaluate(subject), Value::Bool(true))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Subject => write!(f, "it"),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Not(inner) => write!(f, "!({})", inner),
            Expr::And(l, r) => write!(f, "({} && {})", l, r),
            Expr::Or(l, r) => write!(f, "({} || {})", l, r),
            Expr::Compare(op, l, r) => write!(f, "{} {} {}", l, op.as_str(), r),
            Expr::Matches(operand, re) => {
                write!(f, "{} ~ {}", operand, Value::String(re.as_str().to_string()))
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        _ => {
            let comparable = matches!(
                (left, right),
                (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
            );
            if !comparable {
                return false;
            }
            let ord = compare_values(left, right);
            match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Lte => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Gte => ord != Ordering::Less,
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Ne => ord != Ordering::Equal,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Subject,
    Literal(Value),
    Cmp(CmpOp),
    Tilde,
    And,
    Or,
    Bang,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Subject => write!(f, "'it'"),
            Token::Literal(v) => write!(f, "{}", v),
            Token::Cmp(op) => write!(f, "'{}'", op.as_str()),
            Token::Tilde => write!(f, "'~'"),
            Token::And => write!(f, "'&&'"),
            Token::Or => write!(f, "'||'"),
            Token::Bang => write!(f, "'!'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(source: &str) -> TreeResult<Vec<(usize, Token)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => {
                tokens.push((start, Token::LParen));
                i += 1;
            }
            b')' => {
                tokens.push((start, Token::RParen));
                i += 1;
            }
            b'~' => {
                tokens.push((start, Token::Tilde));
                i += 1;
            }
            b'&' | b'|' => {
                if bytes.get(i + 1) != Some(&c) {
                    return Err(TreeError::expression(start, "expected '&&' or '||'"));
                }
                tokens.push((start, if c == b'&' { Token::And } else { Token::Or }));
                i += 2;
            }
            b'=' | b'!' | b'<' | b'>' => {
                let followed_by_eq = bytes.get(i + 1) == Some(&b'=');
                let token = match (c, followed_by_eq) {
                    (b'=', true) => Token::Cmp(CmpOp::Eq),
                    (b'!', true) => Token::Cmp(CmpOp::Ne),
                    (b'<', true) => Token::Cmp(CmpOp::Lte),
                    (b'>', true) => Token::Cmp(CmpOp::Gte),
                    (b'<', false) => Token::Cmp(CmpOp::Lt),
                    (b'>', false) => Token::Cmp(CmpOp::Gt),
                    (b'!', false) => Token::Bang,
                    _ => return Err(TreeError::expression(start, "assignment is not allowed")),
                };
                // `===` and `!==` read the same as `==` and `!=`
                i += if followed_by_eq { 2 } else { 1 };
                if followed_by_eq && matches!(c, b'=' | b'!') && bytes.get(i) == Some(&b'=') {
                    i += 1;
                }
                tokens.push((start, token));
            }
            b'"' => {
                let end = scan_string(bytes, i)?;
                let literal: Value = serde_json::from_str(&source[i..end])
                    .map_err(|e| TreeError::expression(start, format!("bad string: {}", e)))?;
                tokens.push((start, Token::Literal(literal)));
                i = end;
            }
            b'-' | b'0'..=b'9' => {
                let mut end = i + 1;
                while end < bytes.len()
                    && matches!(bytes[end], b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
                {
                    end += 1;
                }
                let literal: Value = serde_json::from_str(&source[i..end])
                    .map_err(|_| TreeError::expression(start, "bad number"))?;
                if !literal.is_number() {
                    return Err(TreeError::expression(start, "bad number"));
                }
                tokens.push((start, Token::Literal(literal)));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let mut end = i + 1;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                let token = match &source[i..end] {
                    "it" => Token::Subject,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" | "undefined" => Token::Literal(Value::Null),
                    word => {
                        return Err(TreeError::expression(start, format!("unknown identifier '{}'", word)))
                    }
                };
                tokens.push((start, token));
                i = end;
            }
            _ => {
                return Err(TreeError::expression(
                    start,
                    format!("unexpected character '{}'", c as char),
                ))
            }
        }
    }

    Ok(tokens)
}

/// Returns the byte offset just past the closing quote
fn scan_string(bytes: &[u8], start: usize) -> TreeResult<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(TreeError::expression(start, "unterminated string"))
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_spanned(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(offset, t)| (*offset, t))
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or_else(|| self.tokens.last().map(|(o, _)| o + 1).unwrap_or(0))
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> TreeResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> TreeResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> TreeResult<Expr> {
        if self.peek() == Some(&Token::Bang) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> TreeResult<Expr> {
        let left = self.parse_primary()?;
        match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                let right = self.parse_primary()?;
                Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
            }
            Some(Token::Tilde) => {
                self.pos += 1;
                let offset = self.offset();
                match self.next() {
                    Some(Token::Literal(Value::String(pattern))) => {
                        let re = Regex::new(&pattern)
                            .map_err(|e| TreeError::expression(offset, format!("bad regex: {}", e)))?;
                        Ok(Expr::Matches(Box::new(left), re))
                    }
                    _ => Err(TreeError::expression(offset, "'~' expects a string pattern")),
                }
            }
            _ => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> TreeResult<Expr> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Subject) => Ok(Expr::Subject),
            Some(Token::Literal(v)) => Ok(Expr::Literal(v)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(TreeError::expression(offset, "unclosed '('")),
                }
            }
            Some(token) => Err(TreeError::expression(offset, format!("unexpected token {}", token))),
            None => Err(TreeError::expression(offset, "unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keeps(source: &str, subject: Value) -> bool {
        Expr::parse(source).unwrap().test(&subject)
    }

    #[test]
    fn test_numeric_range() {
        assert!(keeps("it > 10 && it <= 50", json!(20)));
        assert!(!keeps("it > 10 && it <= 50", json!(60)));
        assert!(keeps("it >= 20", json!(20.0)));
    }

    #[test]
    fn test_mixed_types_never_order() {
        assert!(!keeps("it > 10", json!("20")));
        assert!(!keeps("it < \"z\"", json!(1)));
    }

    #[test]
    fn test_or_and_not() {
        assert!(keeps("it == \"a\" || it == \"b\"", json!("b")));
        assert!(keeps("!(it == 1)", json!(2)));
        assert!(!keeps("!(it == 1)", json!(1)));
    }

    #[test]
    fn test_triple_equals_accepted() {
        assert!(keeps("it === 3", json!(3)));
        assert!(keeps("it !== 3", json!(4)));
    }

    #[test]
    fn test_regex_match() {
        assert!(keeps("it ~ \"^xp\"", json!("xps")));
        assert!(!keeps("it ~ \"^xp\"", json!("mac")));
        assert!(!keeps("it ~ \"^xp\"", json!(5)));
    }

    #[test]
    fn test_only_true_keeps() {
        assert!(!keeps("it", json!(1)));
        assert!(keeps("true", json!(null)));
    }

    #[test]
    fn test_null_comparison() {
        assert!(keeps("it != null", json!(0)));
        assert!(keeps("it == undefined", json!(null)));
    }

    #[test]
    fn test_rejects_code() {
        assert!(Expr::parse("it = 3").is_err());
        assert!(Expr::parse("process.exit()").is_err());
        assert!(Expr::parse("it > ").is_err());
        assert!(Expr::parse("(it > 1").is_err());
        assert!(Expr::parse("it > 1 2").is_err());
    }

    #[test]
    fn test_display_reparses() {
        let expr = Expr::parse("it > 1 && !(it == \"x\") || it ~ \"a.c\"").unwrap();
        let again = Expr::parse(&expr.to_string()).unwrap();
        for subject in [json!(2), json!("x"), json!("abc"), json!(0)] {
            assert_eq!(expr.test(&subject), again.test(&subject));
        }
    }
}
