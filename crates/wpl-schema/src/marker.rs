//! PEP 508 environment markers.
//!
//! A marker is the `; python_version >= "3.8" and extra == "test"` tail of a
//! requirement. It is parsed into a small expression tree and evaluated
//! against a [`MarkerEnvironment`] describing the target interpreter, with
//! an optional `extra` value supplied per evaluation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::name::canonicalize;
use crate::specifier::Specifier;
use crate::version::Version;

/// Error produced when a marker expression cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    /// A string literal was opened but never closed.
    #[error("unterminated string in marker {0:?}")]
    UnterminatedString(String),

    /// An unexpected character or token was found.
    #[error("unexpected {token:?} in marker {marker:?}")]
    Unexpected {
        /// The offending token.
        token: String,
        /// The full marker text.
        marker: String,
    },

    /// The expression ended early.
    #[error("incomplete marker {0:?}")]
    Incomplete(String),

    /// An identifier that is not a known marker variable.
    #[error("unknown marker variable {0:?}")]
    UnknownVariable(String),
}

const VARIABLES: &[&str] = &[
    "python_version",
    "python_full_version",
    "os_name",
    "sys_platform",
    "platform_release",
    "platform_system",
    "platform_version",
    "platform_machine",
    "platform_python_implementation",
    "implementation_name",
    "implementation_version",
    "extra",
];

/// Values of the marker variables for one target interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerEnvironment {
    values: HashMap<String, String>,
}

impl MarkerEnvironment {
    /// An environment with no variables set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one variable, returning the updated environment.
    pub fn with(mut self, variable: &str, value: &str) -> Self {
        self.values.insert(variable.to_string(), value.to_string());
        self
    }

    /// Look up a variable. Unset variables read as the empty string.
    pub fn get(&self, variable: &str) -> &str {
        self.values.get(variable).map_or("", String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Variable(String),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
    Compatible,
    Arbitrary,
    In,
    NotIn,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::Compatible => "~=",
            Self::Arbitrary => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Value, CompareOp, Value),
}

/// A parsed environment marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    expr: Expr,
}

impl Marker {
    /// Evaluate with no `extra` value.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        eval(&self.expr, env, None)
    }

    /// Evaluate with `extra` bound to the given (canonicalized) extra name.
    pub fn evaluate_with_extra(&self, env: &MarkerEnvironment, extra: &str) -> bool {
        eval(&self.expr, env, Some(extra))
    }

    /// Whether the expression mentions the `extra` variable anywhere.
    pub fn references_extra(&self) -> bool {
        fn walk(expr: &Expr) -> bool {
            match expr {
                Expr::And(a, b) | Expr::Or(a, b) => walk(a) || walk(b),
                Expr::Compare(l, _, r) => [l, r]
                    .iter()
                    .any(|v| matches!(v, Value::Variable(name) if name == "extra")),
            }
        }
        walk(&self.expr)
    }
}

fn eval(expr: &Expr, env: &MarkerEnvironment, extra: Option<&str>) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, env, extra) && eval(b, env, extra),
        Expr::Or(a, b) => eval(a, env, extra) || eval(b, env, extra),
        Expr::Compare(lhs, op, rhs) => {
            let is_extra = [lhs, rhs]
                .iter()
                .any(|v| matches!(v, Value::Variable(name) if name == "extra"));
            let resolve = |value: &Value| -> String {
                let raw = match value {
                    Value::Variable(name) if name == "extra" => {
                        extra.map_or_else(|| env.get("extra").to_string(), str::to_string)
                    }
                    Value::Variable(name) => env.get(name).to_string(),
                    Value::Literal(s) => s.clone(),
                };
                if is_extra { canonicalize(&raw) } else { raw }
            };
            compare(&resolve(lhs), *op, &resolve(rhs))
        }
    }
}

fn compare(lhs: &str, op: CompareOp, rhs: &str) -> bool {
    match op {
        CompareOp::In => return rhs.contains(lhs),
        CompareOp::NotIn => return !rhs.contains(lhs),
        _ => {}
    }

    if let (Ok(spec), Ok(version)) = (
        format!("{}{rhs}", op.as_str()).parse::<Specifier>(),
        lhs.parse::<Version>(),
    ) {
        return spec.contains(&version);
    }

    match op {
        CompareOp::Equal | CompareOp::Arbitrary => lhs == rhs,
        CompareOp::NotEqual => lhs != rhs,
        CompareOp::Less => lhs < rhs,
        CompareOp::LessEqual => lhs <= rhs,
        CompareOp::Greater => lhs > rhs,
        CompareOp::GreaterEqual => lhs >= rhs,
        CompareOp::Compatible | CompareOp::In | CompareOp::NotIn => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(CompareOp),
    Ident(String),
    Str(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, MarkerError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| MarkerError::UnterminatedString(input.to_string()))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '<' | '>' | '=' | '!' | '~' => {
                let run: String = chars[i..]
                    .iter()
                    .take_while(|ch| matches!(ch, '<' | '>' | '=' | '!' | '~'))
                    .collect();
                let op = match run.as_str() {
                    "<" => CompareOp::Less,
                    "<=" => CompareOp::LessEqual,
                    "==" => CompareOp::Equal,
                    "!=" => CompareOp::NotEqual,
                    ">=" => CompareOp::GreaterEqual,
                    ">" => CompareOp::Greater,
                    "~=" => CompareOp::Compatible,
                    "===" => CompareOp::Arbitrary,
                    _ => {
                        return Err(MarkerError::Unexpected {
                            token: run,
                            marker: input.to_string(),
                        });
                    }
                };
                i += run.chars().count();
                tokens.push(Token::Op(op));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let word: String = chars[i..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_alphanumeric() || **ch == '_' || **ch == '.')
                    .collect();
                i += word.chars().count();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "in" => Token::Op(CompareOp::In),
                    "not" => {
                        if let Some(Token::Ident(_) | Token::Str(_)) = tokens.last() {
                            // `not in` is the only use of `not`.
                            let rest: String = chars[i..].iter().collect();
                            let trimmed = rest.trim_start();
                            if let Some(after) = trimmed.strip_prefix("in") {
                                i += rest.chars().count() - after.chars().count();
                                Token::Op(CompareOp::NotIn)
                            } else {
                                return Err(MarkerError::Unexpected {
                                    token: word,
                                    marker: input.to_string(),
                                });
                            }
                        } else {
                            return Err(MarkerError::Unexpected {
                                token: word,
                                marker: input.to_string(),
                            });
                        }
                    }
                    _ => {
                        let name = word.replace('.', "_");
                        if !VARIABLES.contains(&name.as_str()) {
                            return Err(MarkerError::UnknownVariable(word));
                        }
                        Token::Ident(name)
                    }
                };
                tokens.push(token);
            }
            _ => {
                return Err(MarkerError::Unexpected {
                    token: c.to_string(),
                    marker: input.to_string(),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, MarkerError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| MarkerError::Incomplete(self.input.to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token) -> MarkerError {
        MarkerError::Unexpected {
            token: format!("{token:?}"),
            marker: self.input.to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, MarkerError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, MarkerError> {
        let mut left = self.parse_atom()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_atom()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Expr, MarkerError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            match self.next()? {
                Token::RParen => return Ok(inner),
                other => return Err(self.unexpected(&other)),
            }
        }
        let lhs = self.parse_value()?;
        let op = match self.next()? {
            Token::Op(op) => op,
            other => return Err(self.unexpected(&other)),
        };
        let rhs = self.parse_value()?;
        Ok(Expr::Compare(lhs, op, rhs))
    }

    fn parse_value(&mut self) -> Result<Value, MarkerError> {
        match self.next()? {
            Token::Ident(name) => Ok(Value::Variable(name)),
            Token::Str(s) => Ok(Value::Literal(s)),
            other => Err(self.unexpected(&other)),
        }
    }
}

impl FromStr for Marker {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            tokens: tokenize(s)?,
            pos: 0,
            input: s,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.unexpected(token));
        }
        Ok(Self { expr })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Literal(s) => write!(f, "\"{s}\""),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(l, op, r) => write!(f, "{l} {} {r}", op.as_str()),
            Self::Or(a, b) => write!(f, "{a} or {b}"),
            Self::And(a, b) => {
                write_and_operand(f, a)?;
                f.write_str(" and ")?;
                write_and_operand(f, b)
            }
        }
    }
}

fn write_and_operand(f: &mut fmt::Formatter<'_>, operand: &Expr) -> fmt::Result {
    if matches!(operand, Expr::Or(..)) {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_py311() -> MarkerEnvironment {
        MarkerEnvironment::new()
            .with("python_version", "3.11")
            .with("python_full_version", "3.11.4")
            .with("sys_platform", "linux")
            .with("os_name", "posix")
            .with("platform_machine", "x86_64")
            .with("implementation_name", "cpython")
    }

    fn m(s: &str) -> Marker {
        s.parse().unwrap()
    }

    #[test]
    fn test_version_comparisons() {
        let env = linux_py311();
        assert!(m("python_version >= '3.8'").evaluate(&env));
        assert!(!m("python_version < \"3.10\"").evaluate(&env));
        assert!(m("python_full_version == '3.11.*'").evaluate(&env));
    }

    #[test]
    fn test_prerelease_interpreter_versions_compare() {
        let env = linux_py311().with("python_full_version", "3.13.0rc1");
        assert!(m("python_full_version > '3.12'").evaluate(&env));
        assert!(m("python_full_version >= '3.13.0rc1'").evaluate(&env));
        assert!(!m("python_full_version >= '3.13'").evaluate(&env));
    }

    #[test]
    fn test_boolean_structure() {
        let env = linux_py311();
        assert!(m("sys_platform == 'win32' or os_name == 'posix'").evaluate(&env));
        assert!(!m("sys_platform == 'linux' and (python_version < '3' or os_name == 'nt')")
            .evaluate(&env));
        assert!(m("'linux' in sys_platform and platform_machine not in 'arm64 aarch64'")
            .evaluate(&env));
    }

    #[test]
    fn test_extra_is_canonicalized() {
        let env = linux_py311();
        let marker = m("extra == 'Test_Suite'");
        assert!(marker.references_extra());
        assert!(marker.evaluate_with_extra(&env, "test-suite"));
        assert!(!marker.evaluate_with_extra(&env, "docs"));
        assert!(!marker.evaluate(&env));
    }

    #[test]
    fn test_parse_errors() {
        assert!("python_version >=".parse::<Marker>().is_err());
        assert!("python_version >= '3".parse::<Marker>().is_err());
        assert!("bogus_var == '1'".parse::<Marker>().is_err());
        assert!("(os_name == 'nt'".parse::<Marker>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let text = "python_version >= \"3.8\" and (os_name == \"nt\" or extra == \"x\")";
        assert_eq!(m(text).to_string(), text);
    }
}
