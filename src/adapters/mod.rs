//! Infrastructure Adapters
//!
//! Implementations of the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  CacheBackend │ DurableStore │ TableAdmin │ UpdateListener │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryCacheBackend │ InMemoryDurableStore               │ │
//! │  │ FileDurableStore │ UpdateBus │ LoggingUpdateListener      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tiermap::adapters::{InMemoryCacheBackend, InMemoryDurableStore};
//! use tiermap::domain::ports::DurableStore;
//!
//! let store = InMemoryDurableStore::new();
//! store.put(&key, Value::from(123)).await?;
//! ```

mod file_store;
mod items;
mod listeners;
mod memory_cache;
mod memory_store;

pub use file_store::FileDurableStore;
pub use listeners::{InMemoryUpdateCollector, LoggingUpdateListener, UpdateBus};
pub use memory_cache::{CacheBackendStats, InMemoryCacheBackend};
pub use memory_store::{DurableStoreStats, InMemoryDurableStore};
