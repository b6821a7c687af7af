//! Set member updates
//!
//! Atomic union and difference on set-valued maps. Durable-backed maps
//! update the durable item in place and drop the cached copy; cache-only
//! maps fold the change into the cache with a compare-and-swap loop.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::instrument;

use super::flavor::SetValued;
use super::persistent::PersistentCachedMap;
use crate::domain::events::{UpdateAction, UpdateEvent};
use crate::domain::value::{difference, member_set, union, CombineFn, Member, Value};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
enum MemberOp {
    Insert,
    Remove,
}

impl MemberOp {
    fn combine(self) -> CombineFn {
        match self {
            MemberOp::Insert => union,
            MemberOp::Remove => difference,
        }
    }

    /// Starting point for an absent cache entry. Removing from nothing, or
    /// inserting nothing, must not create the key.
    fn zero(self, members: &BTreeSet<Member>) -> Option<Value> {
        match self {
            MemberOp::Insert if !members.is_empty() => Some(Value::empty_set()),
            MemberOp::Insert | MemberOp::Remove => None,
        }
    }
}

impl PersistentCachedMap<SetValued> {
    /// Atomically add `values` to the set stored at `key`.
    #[instrument(skip_all, fields(map = %self.name()))]
    pub async fn insert_values<K, I, M>(&self, key: &K, values: I) -> Result<()>
    where
        K: Serialize + ?Sized,
        I: IntoIterator<Item = M>,
        M: Into<Member>,
    {
        self.update_members(key, member_set(values), MemberOp::Insert)
            .await
    }

    /// Atomically remove `values` from the set stored at `key`. Values that
    /// are not present, or a key that does not exist, are not an error.
    #[instrument(skip_all, fields(map = %self.name()))]
    pub async fn remove_values<K, I, M>(&self, key: &K, values: I) -> Result<()>
    where
        K: Serialize + ?Sized,
        I: IntoIterator<Item = M>,
        M: Into<Member>,
    {
        self.update_members(key, member_set(values), MemberOp::Remove)
            .await
    }

    async fn update_members<K>(&self, key: &K, members: BTreeSet<Member>, op: MemberOp) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let key = self.derive(key)?;

        self.publish(UpdateEvent::pre(self.name(), key.original_key(), UpdateAction::Put))
            .await?;

        let exists = if self.is_cache_only() {
            let zero = op.zero(&members);
            self.cache()
                .atomic_update(key.cache_key(), &Value::Set(members), op.combine(), zero)
                .await?
        } else {
            let durable = self.context().durable();
            let exists = match op {
                MemberOp::Insert => durable.add_members(&key, members).await?,
                MemberOp::Remove => durable.remove_members(&key, members).await?,
            };
            self.context().metrics().record_durable_write();
            self.cache().delete(key.cache_key()).await;
            exists
        };

        // nothing stored: listeners must not see the key as live
        let action = if exists {
            UpdateAction::Put
        } else {
            UpdateAction::Delete
        };
        self.publish(UpdateEvent::post(self.name(), key.original_key(), action))
            .await
    }
}
