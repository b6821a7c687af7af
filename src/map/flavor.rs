//! Map flavors
//!
//! A flavor is the small capability set that turns the generic
//! [`PersistentCachedMap`](super::PersistentCachedMap) into a concrete map:
//! which values it admits, what callers get back, how values are shaped
//! on their way to and from the durable tier, and what a missing key
//! reads as.

use std::collections::BTreeSet;

use crate::domain::value::{Member, Value, EMPTY_SET_SENTINEL};
use crate::error::{Error, Result};

/// Capability set selected when a map is built.
pub trait MapFlavor: Send + Sync + 'static {
    /// What reads return.
    type Item: Send;

    /// Validate a written value, before any I/O.
    fn admit(value: Value) -> Result<Value>;

    /// Convert a loaded value into the read type.
    fn into_item(value: Value) -> Result<Self::Item>;

    /// Shape a value for the durable tier.
    fn pre_save(value: Value) -> Value {
        value
    }

    /// Undo `pre_save` on a value read back from either tier.
    fn post_load(value: Value) -> Value {
        value
    }

    /// What a missing key reads as; `None` means reads fail with `NotFound`.
    fn default_for_missing() -> Option<Self::Item> {
        None
    }
}

/// Plain map: any value, identity transforms, missing keys are errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scalar;

impl MapFlavor for Scalar {
    type Item = Value;

    fn admit(value: Value) -> Result<Value> {
        Ok(value)
    }

    fn into_item(value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Set-valued map: only sets, empty set stored as a sentinel, missing keys
/// read as the empty set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetValued;

impl MapFlavor for SetValued {
    type Item = BTreeSet<Member>;

    fn admit(value: Value) -> Result<Value> {
        match value {
            Value::Set(_) => Ok(value),
            other => Err(Error::TypeMismatch(format!(
                "set maps only hold sets, got a {}",
                other.kind()
            ))),
        }
    }

    fn into_item(value: Value) -> Result<BTreeSet<Member>> {
        match value {
            Value::Set(members) => Ok(members),
            other => Err(Error::TypeMismatch(format!(
                "expected a set, found a {}",
                other.kind()
            ))),
        }
    }

    fn pre_save(value: Value) -> Value {
        match value {
            Value::Set(members) if members.is_empty() => Value::from(EMPTY_SET_SENTINEL),
            other => other,
        }
    }

    fn post_load(value: Value) -> Value {
        if value.is_empty_set_sentinel() {
            Value::empty_set()
        } else {
            value
        }
    }

    fn default_for_missing() -> Option<BTreeSet<Member>> {
        Some(BTreeSet::new())
    }
}
