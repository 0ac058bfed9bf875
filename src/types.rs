//! Core identifier and literal types shared across the planner.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a schema type (entity, relation, or attribute type).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Identifier of a role within a relation type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct RoleId(pub u32);

/// Identifier of a concrete graph element (an instance, not a type).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct ThingId(pub u64);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TypeId {
    fn from(value: u32) -> Self {
        TypeId(value)
    }
}

impl From<u32> for RoleId {
    fn from(value: u32) -> Self {
        RoleId(value)
    }
}

impl From<u64> for ThingId {
    fn from(value: u64) -> Self {
        ThingId(value)
    }
}

/// A slot in the query: either named by the user or minted by the planner.
///
/// Generated variables come from a per-planning-call counter, so they can
/// never collide with user-supplied names.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum Var {
    /// User-supplied variable name.
    Named(String),
    /// Planner-generated variable, unique within one planning call.
    Generated(u32),
}

impl Var {
    /// Creates a named variable.
    pub fn named(name: impl Into<String>) -> Self {
        Var::Named(name.into())
    }

    /// Returns true for planner-generated variables.
    pub fn is_generated(&self) -> bool {
        matches!(self, Var::Generated(_))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Named(name) => write!(f, "${name}"),
            Var::Generated(n) => write!(f, "$_{n}"),
        }
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Var::Named(name.to_string())
    }
}

/// Literal value appearing in attribute constraints.
///
/// Tagged so the serialized form stays unambiguous across bindings. Equality
/// and hashing treat doubles by bit pattern, which keeps plan hashing and
/// fragment dedup well-defined without ordering surprises.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Double(f64),
    /// UTF-8 string literal.
    Str(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => {
                state.write_u8(0);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(1);
                i.hash(state);
            }
            Value::Double(d) => {
                state.write_u8(2);
                d.to_bits().hash(state);
            }
            Value::Str(s) => {
                state.write_u8(3);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_vars_never_equal_named() {
        assert_ne!(Var::named("0"), Var::Generated(0));
        assert_eq!(Var::Generated(7), Var::Generated(7));
    }

    #[test]
    fn var_display() {
        assert_eq!(Var::named("person").to_string(), "$person");
        assert_eq!(Var::Generated(3).to_string(), "$_3");
    }

    #[test]
    fn double_values_compare_by_bits() {
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }
}
