//! Persistent Cached Map
//!
//! Cache-aside map over a volatile cache tier and a durable store.
//!
//! # Protocol
//!
//! ```text
//! set:     pre-update ─▶ cache.set ─▶ durable.put ─▶ post-update
//! get:     cache.get ──hit──▶ value
//!              │ miss
//!              ▼
//!          stampede token? ──yes──▶ durable.get ─▶ cache.set ─▶ value
//!              │ no
//!              ▼
//!          sleep, re-read from the top (bounded)
//! delete:  pre-update ─▶ cache.delete ─▶ durable.delete ─▶ post-update
//! incr:    pre-update ─▶ durable.add_numeric ─▶ cache.delete ─▶ post-update
//!          (cache-only: compare-and-swap loop in the cache)
//! ```
//!
//! In cache-only mode the durable tier is never touched and a cache miss
//! is a `NotFound`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{debug, instrument};

use super::flavor::{MapFlavor, Scalar, SetValued};
use super::index::KEY_INDEX_MAP_NAME;
use super::MapContext;
use crate::cache::{CacheTier, NullCacheTier, SharedCache};
use crate::domain::events::{UpdateAction, UpdateEvent};
use crate::domain::key::CompositeKey;
use crate::domain::value::{add, Number, Value};
use crate::error::{Error, Result};

/// Map holding sets of primitives; missing keys read as the empty set.
///
/// Set maps have no numeric updates:
///
/// ```compile_fail
/// # async fn bump(tags: &tiermap::PersistentCachedSetMap) {
/// tags.increment("k", 1).await;
/// # }
/// ```
pub type PersistentCachedSetMap = PersistentCachedMap<SetValued>;

/// Cache-aside, durably-backed map.
pub struct PersistentCachedMap<F: MapFlavor> {
    name: String,
    ctx: MapContext,
    cache: Arc<dyn CacheTier>,
    cache_only: bool,
    _flavor: PhantomData<F>,
}

impl<F: MapFlavor> PersistentCachedMap<F> {
    pub(crate) fn open(ctx: &MapContext, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("map name must not be empty".into()));
        }
        if name == KEY_INDEX_MAP_NAME {
            return Err(Error::InvalidArgument(format!(
                "map name {} is reserved for the key index",
                name
            )));
        }
        Ok(Self::open_unchecked(ctx, name))
    }

    pub(crate) fn open_unchecked(ctx: &MapContext, name: &str) -> Self {
        let config = ctx.config();
        let cache = SharedCache::new(
            ctx.cache_backend(),
            config.cache_entry_ttl(),
            config.stampede_lock_ttl(),
            Arc::clone(ctx.metrics()),
        );

        Self {
            name: name.to_string(),
            ctx: ctx.clone(),
            cache: Arc::new(cache),
            cache_only: config.cache_only,
            _flavor: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cache_only(&self) -> bool {
        self.cache_only
    }

    pub fn is_caching_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    pub fn context(&self) -> &MapContext {
        &self.ctx
    }

    /// Bypass the cache tier from now on.
    ///
    /// Fails on a cache-only map, which has no durable tier to fall back to.
    pub fn disable_caching(&mut self) -> Result<()> {
        if self.cache_only {
            return Err(Error::InvalidOperation(format!(
                "cannot disable caching on cache-only map {}",
                self.name
            )));
        }
        self.cache = Arc::new(NullCacheTier);
        debug!(map = %self.name, "Caching disabled");
        Ok(())
    }

    /// Write `value` to both tiers.
    #[instrument(skip_all, fields(map = %self.name))]
    pub async fn set<K>(&self, key: &K, value: impl Into<Value>) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let value = F::admit(value.into())?;
        let key = self.derive(key)?;
        let stored = F::pre_save(value.clone());
        self.check_storable(&stored)?;

        self.publish(UpdateEvent::pre(&self.name, key.original_key(), UpdateAction::Put))
            .await?;

        self.cache.set(key.cache_key(), value).await;
        if !self.cache_only {
            self.ctx.durable().put(&key, stored).await?;
            self.ctx.metrics().record_durable_write();
        }

        self.publish(UpdateEvent::post(&self.name, key.original_key(), UpdateAction::Put))
            .await
    }

    /// Read a value, falling back to the durable tier on a cache miss.
    #[instrument(skip_all, fields(map = %self.name))]
    pub async fn get<K>(&self, key: &K) -> Result<F::Item>
    where
        K: Serialize + ?Sized,
    {
        let key = self.derive(key)?;
        match self.fetch(&key).await {
            Ok(value) => F::into_item(value),
            Err(e) if e.is_not_found() => F::default_for_missing().ok_or(e),
            Err(e) => Err(e),
        }
    }

    /// Read a value, or `default` when the key is absent.
    pub async fn get_or<K>(&self, key: &K, default: F::Item) -> Result<F::Item>
    where
        K: Serialize + ?Sized,
    {
        let key = self.derive(key)?;
        match self.fetch(&key).await {
            Ok(value) => F::into_item(value),
            Err(e) if e.is_not_found() => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Whether the key is stored in either tier.
    pub async fn contains<K>(&self, key: &K) -> Result<bool>
    where
        K: Serialize + ?Sized,
    {
        let key = self.derive(key)?;
        match self.fetch(&key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove a key from both tiers. Removing an absent key succeeds.
    #[instrument(skip_all, fields(map = %self.name))]
    pub async fn delete<K>(&self, key: &K) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let key = self.derive(key)?;

        self.publish(UpdateEvent::pre(&self.name, key.original_key(), UpdateAction::Delete))
            .await?;

        self.cache.delete(key.cache_key()).await;
        if !self.cache_only {
            self.ctx.durable().delete(&key).await?;
            self.ctx.metrics().record_durable_write();
        }

        self.publish(UpdateEvent::post(&self.name, key.original_key(), UpdateAction::Delete))
            .await
    }

    /// Live keys as recorded by the context's key index.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let index = self.ctx.key_index().ok_or_else(|| {
            Error::InvalidOperation(format!(
                "map {} cannot list keys without a key index",
                self.name
            ))
        })?;
        index.keys_of(&self.name).await
    }

    /// Scan the durable partition for every stored key.
    ///
    /// A full partition read; not for hot paths.
    pub async fn scan_keys(&self) -> Result<BoxStream<'static, Result<String>>> {
        if self.cache_only {
            return Err(Error::InvalidOperation(format!(
                "cache-only map {} has no durable partition to scan",
                self.name
            )));
        }
        let hash_key = CompositeKey::hash_key_for(&self.name, self.ctx.config().test_namespace);
        self.ctx.durable().query_keys(&hash_key).await
    }

    pub(crate) fn derive<K>(&self, key: &K) -> Result<CompositeKey>
    where
        K: Serialize + ?Sized,
    {
        CompositeKey::derive(&self.name, key, self.ctx.config().test_namespace)
    }

    pub(crate) fn cache(&self) -> &dyn CacheTier {
        self.cache.as_ref()
    }

    pub(crate) async fn publish(&self, event: UpdateEvent) -> Result<()> {
        self.ctx.bus().publish(&event).await
    }

    /// Stampede-protected read of the raw (post-load) value.
    async fn fetch(&self, key: &CompositeKey) -> Result<Value> {
        let config = self.ctx.config();
        let metrics = self.ctx.metrics();
        let mut waits = 0u32;

        loop {
            if let Some(value) = self.cache.get(key.cache_key()).await {
                metrics.record_cache_hit();
                debug!(cache_key = %key.cache_key(), "Cache hit");
                return Ok(F::post_load(value));
            }
            metrics.record_cache_miss();

            if self.cache_only {
                return Err(Error::not_found(&self.name, key.original_key()));
            }

            if self.cache.acquire_stampede_token(key).await {
                debug!(cache_key = %key.cache_key(), "Cache miss, fetching from durable store");
                metrics.record_durable_fetch();
                let value = F::post_load(self.ctx.durable().get(key).await?);
                self.cache.set(key.cache_key(), value.clone()).await;
                return Ok(value);
            }

            if waits >= config.max_stampede_retries {
                return Err(Error::StampedeRetriesExhausted {
                    key: key.to_string(),
                    attempts: waits,
                });
            }
            waits += 1;
            metrics.record_stampede_wait();
            debug!(
                cache_key = %key.cache_key(),
                waits = waits,
                "Another reader is fetching, waiting"
            );
            tokio::time::sleep(config.stampede_wait).await;
        }
    }

    fn check_storable(&self, stored: &Value) -> Result<()> {
        if self.cache_only {
            return Ok(());
        }
        let size = stored.size_bytes();
        let limit = self.ctx.config().max_value_bytes;
        if size > limit {
            return Err(Error::ValueTooLarge { size, limit });
        }
        if matches!(stored, Value::Set(members) if members.is_empty()) {
            return Err(Error::InvalidArgument(
                "the durable tier cannot store an empty set in a plain map".into(),
            ));
        }
        Ok(())
    }
}

impl<F: MapFlavor> fmt::Debug for PersistentCachedMap<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCachedMap")
            .field("name", &self.name)
            .field("flavor", &std::any::type_name::<F>())
            .field("cache_only", &self.cache_only)
            .field("caching_enabled", &self.cache.is_enabled())
            .finish()
    }
}

// =============================================================================
// Numeric Updates
// =============================================================================

impl PersistentCachedMap<Scalar> {
    /// Atomically add `delta` to the stored number; a missing key counts as 0.
    #[instrument(skip_all, fields(map = %self.name))]
    pub async fn increment<K>(&self, key: &K, delta: impl Into<Value>) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let delta = numeric_delta(delta.into())?;
        self.add_numeric(key, delta).await
    }

    /// Atomically subtract `delta` from the stored number.
    #[instrument(skip_all, fields(map = %self.name))]
    pub async fn decrement<K>(&self, key: &K, delta: impl Into<Value>) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let delta = numeric_delta(delta.into())?;
        self.add_numeric(key, delta.negate()).await
    }

    async fn add_numeric<K>(&self, key: &K, delta: Number) -> Result<()>
    where
        K: Serialize + ?Sized,
    {
        let key = self.derive(key)?;

        self.publish(UpdateEvent::pre(&self.name, key.original_key(), UpdateAction::Put))
            .await?;

        if self.cache_only {
            self.cache
                .atomic_update(key.cache_key(), &Value::Num(delta), add, Some(Value::from(0)))
                .await?;
        } else {
            self.ctx.durable().add_numeric(&key, delta).await?;
            self.ctx.metrics().record_durable_write();
            // The authoritative total lives in the durable tier now.
            self.cache.delete(key.cache_key()).await;
        }

        self.publish(UpdateEvent::post(&self.name, key.original_key(), UpdateAction::Put))
            .await
    }
}

fn numeric_delta(delta: Value) -> Result<Number> {
    match delta {
        Value::Num(n) if n.is_finite() => Ok(n),
        Value::Num(n) => Err(Error::InvalidArgument(format!(
            "delta must be finite, got {}",
            n
        ))),
        other => Err(Error::InvalidArgument(format!(
            "delta must be a number, got a {}",
            other.kind()
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
