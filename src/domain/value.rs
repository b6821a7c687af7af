//! Map values
//!
//! The opaque carrier both tiers agree on: strings, numbers and sets of
//! primitives, plus the combine operations used by atomic updates.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stand-in for the empty set in the durable tier, which cannot store
/// empty collections. The NUL bytes keep it out of reach of ordinary input.
pub const EMPTY_SET_SENTINEL: &str = "\u{0}__tiermap_empty_set__\u{0}";

// =============================================================================
// Number
// =============================================================================

/// Numeric value. Integers stay integers until mixed with a float or an
/// addition overflows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn zero() -> Self {
        Number::Int(0)
    }

    /// Add two numbers.
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 + b as f64)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn negate(self) -> Number {
        match self {
            Number::Int(i) => i
                .checked_neg()
                .map(Number::Int)
                .unwrap_or(Number::Float(-(i as f64))),
            Number::Float(f) => Number::Float(-f),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_finite(self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(f) => f.is_finite(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number::Int(i)
    }
}

impl From<i32> for Number {
    fn from(i: i32) -> Self {
        Number::Int(i as i64)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

// =============================================================================
// Member
// =============================================================================

/// A primitive that can live inside a set value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Member {
    Int(i64),
    Str(String),
}

impl Member {
    fn size_bytes(&self) -> usize {
        match self {
            Member::Int(i) => i.to_string().len(),
            Member::Str(s) => s.len(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Int(i) => write!(f, "{}", i),
            Member::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Member {
    fn from(s: &str) -> Self {
        Member::Str(s.to_string())
    }
}

impl From<String> for Member {
    fn from(s: String) -> Self {
        Member::Str(s)
    }
}

impl From<i64> for Member {
    fn from(i: i64) -> Self {
        Member::Int(i)
    }
}

impl From<i32> for Member {
    fn from(i: i32) -> Self {
        Member::Int(i as i64)
    }
}

/// Collect anything member-like into a set.
pub fn member_set<I, M>(members: I) -> BTreeSet<Member>
where
    I: IntoIterator<Item = M>,
    M: Into<Member>,
{
    members.into_iter().map(Into::into).collect()
}

// =============================================================================
// Value
// =============================================================================

/// A value stored in either tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Num(Number),
    Set(BTreeSet<Member>),
}

impl Value {
    /// Build a set value from member-like items.
    pub fn set<I, M>(members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Member>,
    {
        Value::Set(member_set(members))
    }

    pub fn empty_set() -> Self {
        Value::Set(BTreeSet::new())
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Member>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty_set_sentinel(&self) -> bool {
        matches!(self, Value::Str(s) if s == EMPTY_SET_SENTINEL)
    }

    /// Approximate stored size, as the durable tier accounts for it.
    pub fn size_bytes(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Num(n) => n.to_string().len(),
            Value::Set(members) => members.iter().map(Member::size_bytes).sum(),
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Num(_) => "number",
            Value::Set(_) => "set",
        }
    }

    /// Parse command-line text: integer, then float, else string.
    pub fn parse_loose(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Num(Number::Int(i));
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Num(Number::Float(f)),
            _ => Value::Str(text.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Num(n) => write!(f, "{}", n),
            Value::Set(members) => {
                write!(f, "{{")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Num(Number::Int(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Num(Number::Int(i as i64))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Num(Number::Float(f))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Num(n)
    }
}

impl From<BTreeSet<Member>> for Value {
    fn from(s: BTreeSet<Member>) -> Self {
        Value::Set(s)
    }
}

// =============================================================================
// Combine Operations
// =============================================================================

/// Folds a delta into the current value during an atomic update.
pub type CombineFn = fn(&Value, &Value) -> Result<Value>;

/// Numeric addition.
pub fn add(current: &Value, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a.add(*b))),
        (a, b) => Err(Error::TypeMismatch(format!(
            "cannot add a {} to a {}",
            b.kind(),
            a.kind()
        ))),
    }
}

/// Set union.
pub fn union(current: &Value, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (Value::Set(a), Value::Set(b)) => Ok(Value::Set(a.union(b).cloned().collect())),
        (a, b) => Err(Error::TypeMismatch(format!(
            "cannot union a {} into a {}",
            b.kind(),
            a.kind()
        ))),
    }
}

/// Set difference.
pub fn difference(current: &Value, delta: &Value) -> Result<Value> {
    match (current, delta) {
        (Value::Set(a), Value::Set(b)) => Ok(Value::Set(a.difference(b).cloned().collect())),
        (a, b) => Err(Error::TypeMismatch(format!(
            "cannot remove a {} from a {}",
            b.kind(),
            a.kind()
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
