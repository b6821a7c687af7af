//! Item update rules shared by the durable adapters.
//!
//! A durable item cannot hold an empty set, so member operations read a
//! sentinel-valued item as the empty set and write the sentinel back when
//! the last member goes away.

use std::collections::BTreeSet;

use crate::domain::value::{Member, Number, Value, EMPTY_SET_SENTINEL};
use crate::error::{Error, Result};

/// Reject values the durable tier cannot represent.
pub(super) fn check_storable(value: &Value) -> Result<()> {
    match value {
        Value::Set(members) if members.is_empty() => Err(Error::InvalidArgument(
            "durable store cannot hold an empty set".into(),
        )),
        Value::Num(n) if !n.is_finite() => Err(Error::InvalidArgument(format!(
            "durable store cannot hold non-finite number {}",
            n
        ))),
        _ => Ok(()),
    }
}

/// New item value after adding `delta`; absence counts as zero.
pub(super) fn add_numeric(current: Option<&Value>, delta: Number) -> Result<Value> {
    match current {
        None => Ok(Value::Num(delta)),
        Some(Value::Num(n)) => Ok(Value::Num(n.add(delta))),
        Some(other) => Err(Error::TypeMismatch(format!(
            "cannot add a number to a {}",
            other.kind()
        ))),
    }
}

/// New item value after a union, or `None` when nothing should be written.
pub(super) fn add_members(
    current: Option<&Value>,
    members: &BTreeSet<Member>,
) -> Result<Option<Value>> {
    let base = match current {
        None if members.is_empty() => return Ok(None),
        None => BTreeSet::new(),
        Some(v) if v.is_empty_set_sentinel() => BTreeSet::new(),
        Some(Value::Set(existing)) => existing.clone(),
        Some(other) => {
            return Err(Error::TypeMismatch(format!(
                "cannot add members to a {}",
                other.kind()
            )))
        }
    };

    let merged: BTreeSet<Member> = base.union(members).cloned().collect();
    if merged.is_empty() {
        return Ok(None);
    }
    Ok(Some(Value::Set(merged)))
}

/// New item value after a difference, or `None` when nothing should be
/// written. A missing item stays missing.
pub(super) fn remove_members(
    current: Option<&Value>,
    members: &BTreeSet<Member>,
) -> Result<Option<Value>> {
    match current {
        None => Ok(None),
        Some(v) if v.is_empty_set_sentinel() => Ok(None),
        Some(Value::Set(existing)) => {
            let remaining: BTreeSet<Member> = existing.difference(members).cloned().collect();
            if remaining.is_empty() {
                Ok(Some(Value::from(EMPTY_SET_SENTINEL)))
            } else {
                Ok(Some(Value::Set(remaining)))
            }
        }
        Some(other) => Err(Error::TypeMismatch(format!(
            "cannot remove members from a {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::member_set;
    use assert_matches::assert_matches;

    #[test]
    fn test_add_members_over_sentinel() {
        let sentinel = Value::from(EMPTY_SET_SENTINEL);
        let next = add_members(Some(&sentinel), &member_set(["a"])).unwrap();
        assert_eq!(next, Some(Value::set(["a"])));
    }

    #[test]
    fn test_remove_last_member_writes_sentinel() {
        let current = Value::set(["a"]);
        let next = remove_members(Some(&current), &member_set(["a"])).unwrap();
        assert_matches!(next, Some(v) if v.is_empty_set_sentinel());
    }

    #[test]
    fn test_remove_from_missing_item_writes_nothing() {
        assert_eq!(remove_members(None, &member_set(["a"])).unwrap(), None);
    }

    #[test]
    fn test_numeric_add_on_string_is_type_mismatch() {
        assert_matches!(
            add_numeric(Some(&Value::from("x")), Number::Int(1)),
            Err(Error::TypeMismatch(_))
        );
    }

    #[test]
    fn test_check_storable() {
        assert_matches!(
            check_storable(&Value::empty_set()),
            Err(Error::InvalidArgument(_))
        );
        assert!(check_storable(&Value::from(EMPTY_SET_SENTINEL)).is_ok());
    }
}
