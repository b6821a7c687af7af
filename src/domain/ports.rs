//! Domain Ports (Port/Adapter Pattern)
//!
//! The narrow interfaces the maps consume. Adapters implement these traits;
//! the maps only ever see `Arc<dyn Port>`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Map Layer                            │
//! │   PersistentCachedMap │ SecondaryKeyIndex │ Cleanup        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Ports (Traits)                         │
//! │  CacheBackend │ DurableStore │ TableAdmin │ UpdateListener │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Adapters (Impls)                        │
//! │  InMemoryCacheBackend │ InMemoryDurableStore │ FileStore   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::events::UpdateEvent;
use super::key::CompositeKey;
use super::value::{Member, Number, Value};
use crate::error::Result;

// =============================================================================
// Volatile Cache Port
// =============================================================================

/// Port for the shared, volatile cache tier.
///
/// Keys are flat strings (`CompositeKey::cache_key`). A `ttl` of `None`
/// means the entry never expires. Errors returned here are never fatal to
/// map operations; the cache tier wrapper swallows them.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value; absence is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Unconditionally store a value.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove a value. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Store only if no live entry exists. Returns whether this call stored it.
    async fn add_if_absent(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool>;

    /// Replace the value only if it still equals `expected` (`None` = must be
    /// absent). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
        ttl: Option<Duration>,
    ) -> Result<bool>;

    /// Drop every entry.
    async fn clear(&self) -> Result<()>;
}

// =============================================================================
// Durable Store Port
// =============================================================================

/// Port for the durable, eventually-consistent key/value store.
///
/// Items are addressed by `(hash_key, range_key)` taken from a
/// [`CompositeKey`]. The store cannot hold empty sets; the map layer
/// writes [`EMPTY_SET_SENTINEL`](super::value::EMPTY_SET_SENTINEL) instead,
/// and member operations treat a sentinel-valued item as the empty set.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Fetch a value. Fails with `NotFound` when the item is absent.
    async fn get(&self, key: &CompositeKey) -> Result<Value>;

    /// Upsert a value.
    async fn put(&self, key: &CompositeKey, value: Value) -> Result<()>;

    /// Delete an item; deleting an absent item is a no-op.
    async fn delete(&self, key: &CompositeKey) -> Result<()>;

    /// Atomically add to a numeric item, creating it with `delta` if absent.
    async fn add_numeric(&self, key: &CompositeKey, delta: Number) -> Result<()>;

    /// Atomically union members into a set item, creating it if absent.
    /// Returns whether the item exists afterwards; adding nothing to a
    /// missing item creates nothing.
    async fn add_members(&self, key: &CompositeKey, members: BTreeSet<Member>) -> Result<bool>;

    /// Atomically remove members from a set item. A missing item stays
    /// missing. Returns whether the item exists afterwards.
    async fn remove_members(&self, key: &CompositeKey, members: BTreeSet<Member>)
        -> Result<bool>;

    /// Scan a whole partition, yielding canonical key text per item.
    ///
    /// Expensive: a full partition read. Not for hot paths.
    async fn query_keys(&self, hash_key: &str) -> Result<BoxStream<'static, Result<String>>>;
}

// =============================================================================
// Table Administration Port
// =============================================================================

/// Layout and capacity of the durable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub hash_key_name: String,
    pub range_key_name: String,
    pub read_units: u64,
    pub write_units: u64,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_key_name: "table".to_string(),
            range_key_name: "key".to_string(),
            read_units: 10,
            write_units: 10,
        }
    }

    pub fn with_throughput(mut self, read_units: u64, write_units: u64) -> Self {
        self.read_units = read_units;
        self.write_units = write_units;
        self
    }
}

/// Port for one-shot table provisioning. Never used on the hot path.
#[async_trait]
pub trait TableAdmin: Send + Sync {
    async fn table_exists(&self, name: &str) -> Result<bool>;

    async fn create_table(&self, spec: &TableSpec) -> Result<()>;
}

// =============================================================================
// Update Notification Port
// =============================================================================

/// Subscriber to map update notifications.
#[async_trait]
pub trait UpdateListener: Send + Sync {
    async fn on_update(&self, event: &UpdateEvent) -> Result<()>;
}
