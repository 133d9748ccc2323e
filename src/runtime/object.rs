//! Runtime values referenced by handles
//!
//! Every handle points at exactly one `Value`. Primitive values are
//! immutable once constructed; actor addresses keep their actor reachable.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::actor::ActorRef;

/// A value owned by a reference-counted handle
#[derive(Debug)]
pub enum Value {
    /// Placeholder for "no value", e.g. an absent reply target at the native ABI
    Unit,
    /// Boxed integer
    Int(i64),
    /// Boxed float
    Float(f64),
    /// Interned-by-value symbol
    Atom(Box<str>),
    /// Address of an actor or continuation
    Actor(ActorRef),
}

/// Discriminant of a [`Value`], used in diagnostics and patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// `Value::Unit`
    Unit,
    /// `Value::Int`
    Int,
    /// `Value::Float`
    Float,
    /// `Value::Atom`
    Atom,
    /// `Value::Actor` pointing at an ordinary actor
    Actor,
    /// `Value::Actor` pointing at a continuation
    Continuation,
}

impl Value {
    /// Build an atom from any string-like input
    pub fn atom(text: impl Into<String>) -> Self {
        Value::Atom(text.into().into_boxed_str())
    }

    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Unit => ValueKind::Unit,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Atom(_) => ValueKind::Atom,
            Value::Actor(actor) if actor.is_continuation() => ValueKind::Continuation,
            Value::Actor(_) => ValueKind::Actor,
        }
    }

    /// The actor address, if this value is one
    pub fn as_actor(&self) -> Option<&ActorRef> {
        match self {
            Value::Actor(actor) => Some(actor),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Actor(a), Value::Actor(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "_"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Atom(v) => write!(f, "{}", v),
            Value::Actor(actor) => match actor.owner() {
                Some(owner) => write!(f, "{}[...]", owner),
                None => write!(f, "{}", actor.id()),
            },
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Unit => "unit",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Atom => "atom",
            ValueKind::Actor => "actor",
            ValueKind::Continuation => "continuation",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_display() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::atom("ping").to_string(), "ping");
        assert_eq!(Value::Unit.to_string(), "_");
    }

    #[test]
    fn equality_is_structural_for_primitives() {
        assert_eq!(Value::atom("a"), Value::atom("a"));
        assert_ne!(Value::atom("a"), Value::atom("b"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Int(3).kind(), ValueKind::Int);
    }
}
