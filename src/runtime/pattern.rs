//! Value patterns
//!
//! Small matcher language used by compiled programs to branch on message
//! payloads without unpacking them by hand.

use serde::{Deserialize, Serialize};

use super::object::{Value, ValueKind};

/// A literal that a pattern can compare against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Matches `Value::Unit`
    Unit,
    /// Matches an equal integer
    Int(i64),
    /// Matches an equal float
    Float(f64),
    /// Matches an atom with the same text
    Atom(String),
}

/// Pattern over a single value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Matches anything
    Any,
    /// Matches values equal to the literal
    Equal(Literal),
    /// Matches any value of the given kind
    Kind(ValueKind),
}

impl Pattern {
    /// Equality pattern for an integer
    pub fn int(value: i64) -> Self {
        Pattern::Equal(Literal::Int(value))
    }

    /// Equality pattern for an atom
    pub fn atom(text: impl Into<String>) -> Self {
        Pattern::Equal(Literal::Atom(text.into()))
    }

    /// Evaluate the pattern against a value
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Kind(kind) => value.kind() == *kind,
            Pattern::Equal(literal) => match (literal, value) {
                (Literal::Unit, Value::Unit) => true,
                (Literal::Int(a), Value::Int(b)) => a == b,
                (Literal::Float(a), Value::Float(b)) => a == b,
                (Literal::Atom(a), Value::Atom(b)) => a.as_str() == &**b,
                _ => false,
            },
        }
    }
}
