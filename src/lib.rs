//! tiermap - Cache-aside Key/Value Maps
//!
//! Dictionary semantics over two physically separate tiers: a fast, shared,
//! volatile cache and a slower, durable, eventually-consistent key/value
//! store. The maps coordinate the two tiers under concurrent access:
//! stampede-suppressed read-through, synchronous write-through, atomic
//! numeric and set updates, and an enumerable key index fed by update
//! notifications.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!   callers ───▶ │  PersistentCachedMap<F>      │ ──▶ UpdateBus ──▶ SecondaryKeyIndex
//!                └──────────────────────────────┘                   TouchedKeyTracker
//!                    │                     │
//!                    ▼                     ▼
//!               CacheTier             DurableStore
//!           (SharedCache/Null)    (in-memory / file)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory and file-backed port implementations, listeners
//! - [`admin`] - One-shot table provisioning
//! - [`cache`] - The cache tier contract over a raw backend
//! - [`config`] - Run modes and map configuration
//! - [`domain`] - Keys, values, ports and update events
//! - [`error`] - Error types
//! - [`map`] - The maps, the key index and test cleanup
//! - [`metrics`] - Cache and durable-tier counters

pub mod adapters;
pub mod admin;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod map;
pub mod metrics;

// Re-export commonly used types
pub use admin::{provision_table, ProvisionOutcome};
pub use config::{MapConfig, ModePolicy, RunMode};
pub use domain::{CompositeKey, Member, Number, Value};
pub use error::{Error, Result};
pub use map::{
    MapContext, PersistentCachedMap, PersistentCachedSetMap, SecondaryKeyIndex,
    TouchedKeyTracker,
};
pub use metrics::{MapMetrics, MetricsSnapshot};
