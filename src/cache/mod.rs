//! Cache Tier
//!
//! The contract the maps rely on from the volatile tier, layered over a
//! raw [`CacheBackend`]:
//!
//! - reads never fail (backend errors read as misses)
//! - writes and deletes are best-effort (backend errors are logged and dropped)
//! - a stampede lock built on add-if-absent with a short TTL
//! - an optimistic compare-and-swap update loop
//!
//! [`NullCacheTier`] keeps the same contract while caching nothing, so a
//! map can bypass the cache without branching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::key::CompositeKey;
use crate::domain::ports::CacheBackend;
use crate::domain::value::{CombineFn, Value};
use crate::error::{Error, Result};
use crate::metrics::MapMetrics;

/// Cache tier contract used by the maps.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Cached value, or `None` on a miss.
    async fn get(&self, cache_key: &str) -> Option<Value>;

    /// Best-effort write with the configured entry timeout.
    async fn set(&self, cache_key: &str, value: Value);

    /// Best-effort, idempotent delete.
    async fn delete(&self, cache_key: &str);

    /// Try to become the single reader fetching `key` from the durable
    /// tier. The lock is never released; it expires after its TTL.
    async fn acquire_stampede_token(&self, key: &CompositeKey) -> bool;

    /// Fold `delta` into the cached value (or `zero` when absent) with
    /// `combine`, retrying from a fresh read until the compare-and-swap lands.
    /// With no `zero`, an absent entry is left absent.
    ///
    /// Returns whether an entry exists afterwards. A backend failure reports
    /// `true`, since the entry's state is unknown.
    async fn atomic_update(
        &self,
        cache_key: &str,
        delta: &Value,
        combine: CombineFn,
        zero: Option<Value>,
    ) -> Result<bool>;

    /// Entry timeout handed to the backend (`None` = no expiry).
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// False for the disabled tier.
    fn is_enabled(&self) -> bool {
        true
    }
}

// =============================================================================
// Shared Cache
// =============================================================================

/// Cache tier backed by a shared [`CacheBackend`].
pub struct SharedCache {
    backend: Arc<dyn CacheBackend>,
    /// Entry TTL (`None` = no expiry)
    entry_ttl: Option<Duration>,
    /// Stampede lock TTL
    lock_ttl: Duration,
    metrics: Arc<MapMetrics>,
}

impl SharedCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        entry_ttl: Option<Duration>,
        lock_ttl: Duration,
        metrics: Arc<MapMetrics>,
    ) -> Self {
        Self {
            backend,
            entry_ttl,
            lock_ttl,
            metrics,
        }
    }

    fn swallow(&self, op: &str, cache_key: &str, err: &Error) {
        self.metrics.record_cache_error();
        warn!(
            op = op,
            cache_key = %cache_key,
            error = %err,
            "Cache backend failed, continuing without cache"
        );
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("entry_ttl", &self.entry_ttl)
            .field("lock_ttl", &self.lock_ttl)
            .finish()
    }
}

#[async_trait]
impl CacheTier for SharedCache {
    fn timeout(&self) -> Option<Duration> {
        self.entry_ttl
    }

    async fn get(&self, cache_key: &str) -> Option<Value> {
        match self.backend.get(cache_key).await {
            Ok(value) => value,
            Err(e) => {
                self.swallow("get", cache_key, &e);
                None
            }
        }
    }

    async fn set(&self, cache_key: &str, value: Value) {
        if let Err(e) = self.backend.set(cache_key, value, self.entry_ttl).await {
            self.swallow("set", cache_key, &e);
        }
    }

    async fn delete(&self, cache_key: &str) {
        if let Err(e) = self.backend.delete(cache_key).await {
            self.swallow("delete", cache_key, &e);
        }
    }

    async fn acquire_stampede_token(&self, key: &CompositeKey) -> bool {
        let token_key = key.stampede_token_key();
        match self
            .backend
            .add_if_absent(&token_key, Value::from(1), Some(self.lock_ttl))
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                // Without a working lock every reader goes to the durable tier.
                self.swallow("add_if_absent", &token_key, &e);
                true
            }
        }
    }

    async fn atomic_update(
        &self,
        cache_key: &str,
        delta: &Value,
        combine: CombineFn,
        zero: Option<Value>,
    ) -> Result<bool> {
        loop {
            let current = match self.backend.get(cache_key).await {
                Ok(current) => current,
                Err(e) => {
                    self.swallow("get", cache_key, &e);
                    return Ok(true);
                }
            };

            let base = match (current.as_ref(), zero.as_ref()) {
                (Some(current), _) => current,
                (None, Some(zero)) => zero,
                (None, None) => return Ok(false),
            };
            let next = combine(base, delta)?;

            match self
                .backend
                .compare_and_swap(cache_key, current.as_ref(), next, self.entry_ttl)
                .await
            {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    self.metrics.record_cas_retry();
                    debug!(cache_key = %cache_key, "Lost compare-and-swap race, retrying");
                }
                Err(e) => {
                    self.swallow("compare_and_swap", cache_key, &e);
                    return Ok(true);
                }
            }
        }
    }
}

// =============================================================================
// Disabled Cache
// =============================================================================

/// Cache tier that caches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheTier;

#[async_trait]
impl CacheTier for NullCacheTier {
    async fn get(&self, _cache_key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _cache_key: &str, _value: Value) {}

    async fn delete(&self, _cache_key: &str) {}

    async fn acquire_stampede_token(&self, _key: &CompositeKey) -> bool {
        true
    }

    async fn atomic_update(
        &self,
        _cache_key: &str,
        _delta: &Value,
        _combine: CombineFn,
        _zero: Option<Value>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

// =============================================================================
// Tests
// =============================================================================
