//! Map Layer
//!
//! Dictionary semantics over the two tiers.
//!
//! - **Context** (this file) - the tiers, config, update bus and metrics
//!   every map is built from
//! - **Flavors** (`flavor.rs`) - plain and set-valued capability sets
//! - **Maps** (`persistent.rs`, `set.rs`) - the cache-aside protocol
//! - **Key index** (`index.rs`) - enumerable keys from update events
//! - **Cleanup** (`cleanup.rs`) - forgets keys written during a test
//!
//! # Example
//!
//! ```ignore
//! let ctx = MapContext::new(cache, durable, MapConfig::default())?.with_key_index();
//! let orders = ctx.map("orders")?;
//! orders.set("a", 123).await?;
//! assert_eq!(orders.get("a").await?, Value::from(123));
//! ```

mod cleanup;
mod flavor;
mod index;
mod persistent;
mod set;

pub use cleanup::TouchedKeyTracker;
pub use flavor::{MapFlavor, Scalar, SetValued};
pub use index::{SecondaryKeyIndex, KEY_INDEX_MAP_NAME};
pub use persistent::{PersistentCachedMap, PersistentCachedSetMap};

use std::sync::Arc;

use crate::adapters::{InMemoryCacheBackend, InMemoryDurableStore, UpdateBus};
use crate::config::MapConfig;
use crate::domain::ports::{CacheBackend, DurableStore, UpdateListener};
use crate::error::Result;
use crate::metrics::MapMetrics;

/// Shared construction context for maps.
///
/// Cheap to clone; every clone talks to the same tiers and publishes on
/// the same bus.
#[derive(Clone)]
pub struct MapContext {
    cache: Arc<dyn CacheBackend>,
    durable: Arc<dyn DurableStore>,
    config: Arc<MapConfig>,
    bus: Arc<UpdateBus>,
    metrics: Arc<MapMetrics>,
    key_index: Option<Arc<SecondaryKeyIndex>>,
}

impl MapContext {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        durable: Arc<dyn DurableStore>,
        config: MapConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache,
            durable,
            config: Arc::new(config),
            bus: Arc::new(UpdateBus::new()),
            metrics: Arc::new(MapMetrics::new()),
            key_index: None,
        })
    }

    /// Context over fresh in-process tiers.
    pub fn in_memory(config: MapConfig) -> Result<Self> {
        Self::new(
            Arc::new(InMemoryCacheBackend::new()),
            Arc::new(InMemoryDurableStore::new()),
            config,
        )
    }

    /// Install the secondary key index and subscribe it to the bus.
    pub fn with_key_index(mut self) -> Self {
        if self.key_index.is_none() {
            let index = Arc::new(SecondaryKeyIndex::new(&self));
            self.bus.subscribe(index.clone());
            self.key_index = Some(index);
        }
        self
    }

    /// Same tiers and config, but a private empty bus and no index.
    pub(crate) fn detached(&self) -> Self {
        Self {
            bus: Arc::new(UpdateBus::new()),
            key_index: None,
            ..self.clone()
        }
    }

    /// Plain map named `name`.
    pub fn map(&self, name: &str) -> Result<PersistentCachedMap<Scalar>> {
        PersistentCachedMap::open(self, name)
    }

    /// Set-valued map named `name`.
    pub fn set_map(&self, name: &str) -> Result<PersistentCachedSetMap> {
        PersistentCachedMap::open(self, name)
    }

    pub fn subscribe(&self, listener: Arc<dyn UpdateListener>) {
        self.bus.subscribe(listener);
    }

    pub fn cache_backend(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.cache)
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    pub fn metrics(&self) -> &Arc<MapMetrics> {
        &self.metrics
    }

    pub fn key_index(&self) -> Option<&Arc<SecondaryKeyIndex>> {
        self.key_index.as_ref()
    }
}

impl std::fmt::Debug for MapContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapContext")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("key_index", &self.key_index.is_some())
            .finish()
    }
}
