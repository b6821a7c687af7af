//! Secondary Key Index
//!
//! The durable tier has no cheap way to list keys, so the index keeps one
//! set per map name holding the canonical text of every live key. It is
//! fed by post-update events: puts add the key, deletes remove it.
//!
//! The view is eventually consistent and only covers mutations published
//! on the owning context's bus. Writers in other processes, or on another
//! context, bypass it.

use async_trait::async_trait;
use tracing::trace;

use super::persistent::{PersistentCachedMap, PersistentCachedSetMap};
use super::MapContext;
use crate::domain::events::{UpdateAction, UpdateEvent};
use crate::domain::ports::UpdateListener;
use crate::domain::value::Member;
use crate::error::Result;

/// Map name under which the index keeps its own sets.
pub const KEY_INDEX_MAP_NAME: &str = "__tiermap_keys__";

/// Key index maintained from update notifications.
#[derive(Debug)]
pub struct SecondaryKeyIndex {
    keys: PersistentCachedSetMap,
}

impl SecondaryKeyIndex {
    /// Index over the tiers of `ctx`. Its own writes go to a detached bus,
    /// so the index never sees them.
    pub(crate) fn new(ctx: &MapContext) -> Self {
        Self {
            keys: PersistentCachedMap::open_unchecked(&ctx.detached(), KEY_INDEX_MAP_NAME),
        }
    }

    /// Live keys of `map_name`, sorted.
    pub async fn keys_of(&self, map_name: &str) -> Result<Vec<String>> {
        let members = self.keys.get(map_name).await?;
        Ok(members
            .into_iter()
            .map(|member| match member {
                Member::Str(key) => key,
                Member::Int(key) => key.to_string(),
            })
            .collect())
    }
}

#[async_trait]
impl UpdateListener for SecondaryKeyIndex {
    async fn on_update(&self, event: &UpdateEvent) -> Result<()> {
        if !event.is_post_update() || event.map_name == KEY_INDEX_MAP_NAME {
            return Ok(());
        }

        trace!(map = %event.map_name, key = %event.key, action = %event.action, "Indexing key");
        match event.action {
            UpdateAction::Put => {
                self.keys
                    .insert_values(&event.map_name, [event.key.as_str()])
                    .await
            }
            UpdateAction::Delete => {
                self.keys
                    .remove_values(&event.map_name, [event.key.as_str()])
                    .await
            }
        }
    }
}
