//! In-Memory Durable Store
//!
//! Partitioned in-process store standing in for the durable tier: one
//! `DashMap` per hash key, items addressed by range key. Read-modify-write
//! operations run under the item's entry lock, so numeric adds and member
//! updates are atomic just as they are on the real tier.
//!
//! Per-operation counters, an optional simulated round-trip latency and an
//! availability switch make it suitable for exercising the map protocol.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use super::items;
use crate::domain::key::CompositeKey;
use crate::domain::ports::{DurableStore, TableAdmin, TableSpec};
use crate::domain::value::{Member, Number, Value};
use crate::error::{Error, Result};

type Partition = DashMap<String, Value>;

/// Durable store operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurableStoreStats {
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub numeric_adds: u64,
    pub member_adds: u64,
    pub member_removes: u64,
    pub queries: u64,
}

/// In-memory durable store
#[derive(Debug)]
pub struct InMemoryDurableStore {
    partitions: DashMap<String, Arc<Partition>>,
    tables: DashMap<String, TableSpec>,
    available: AtomicBool,
    latency: Option<Duration>,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    numeric_adds: AtomicU64,
    member_adds: AtomicU64,
    member_removes: AtomicU64,
    queries: AtomicU64,
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self {
            partitions: DashMap::new(),
            tables: DashMap::new(),
            available: AtomicBool::new(true),
            latency: None,
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            numeric_adds: AtomicU64::new(0),
            member_adds: AtomicU64::new(0),
            member_removes: AtomicU64::new(0),
            queries: AtomicU64::new(0),
        }
    }
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`, like a network round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Raw stored value, bypassing the map layer.
    pub fn raw(&self, key: &CompositeKey) -> Option<Value> {
        self.partitions
            .get(key.hash_key())
            .and_then(|p| p.get(key.range_key()).map(|v| v.clone()))
    }

    /// Number of items across all partitions.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DurableStoreStats {
        DurableStoreStats {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            numeric_adds: self.numeric_adds.load(Ordering::Relaxed),
            member_adds: self.member_adds.load(Ordering::Relaxed),
            member_removes: self.member_removes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
        }
    }

    async fn round_trip(&self, counter: &AtomicU64) -> Result<()> {
        counter.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::DurableUnavailable(
                "durable store is unreachable".into(),
            ));
        }
        Ok(())
    }

    fn partition(&self, hash_key: &str) -> Arc<Partition> {
        Arc::clone(
            self.partitions
                .entry(hash_key.to_string())
                .or_default()
                .value(),
        )
    }

    fn existing_partition(&self, hash_key: &str) -> Option<Arc<Partition>> {
        self.partitions.get(hash_key).map(|p| Arc::clone(p.value()))
    }

    /// Apply a read-modify-write under the item's entry lock. Returns
    /// whether the item exists afterwards.
    fn update_item<F>(&self, key: &CompositeKey, update: F) -> Result<bool>
    where
        F: FnOnce(Option<&Value>) -> Result<Option<Value>>,
    {
        let partition = self.partition(key.hash_key());
        let result = match partition.entry(key.range_key().to_string()) {
            Entry::Occupied(mut occupied) => {
                if let Some(next) = update(Some(occupied.get()))? {
                    occupied.insert(next);
                }
                Ok(true)
            }
            Entry::Vacant(vacant) => match update(None)? {
                Some(next) => {
                    vacant.insert(next);
                    Ok(true)
                }
                None => Ok(false),
            },
        };
        result
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, key: &CompositeKey) -> Result<Value> {
        self.round_trip(&self.gets).await?;
        self.raw(key)
            .ok_or_else(|| Error::not_found(key.map_name(), key.original_key()))
    }

    async fn put(&self, key: &CompositeKey, value: Value) -> Result<()> {
        self.round_trip(&self.puts).await?;
        items::check_storable(&value)?;
        self.partition(key.hash_key())
            .insert(key.range_key().to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &CompositeKey) -> Result<()> {
        self.round_trip(&self.deletes).await?;
        if let Some(partition) = self.existing_partition(key.hash_key()) {
            partition.remove(key.range_key());
        }
        Ok(())
    }

    async fn add_numeric(&self, key: &CompositeKey, delta: Number) -> Result<()> {
        self.round_trip(&self.numeric_adds).await?;
        self.update_item(key, |current| items::add_numeric(current, delta).map(Some))?;
        Ok(())
    }

    async fn add_members(&self, key: &CompositeKey, members: BTreeSet<Member>) -> Result<bool> {
        self.round_trip(&self.member_adds).await?;
        self.update_item(key, |current| items::add_members(current, &members))
    }

    async fn remove_members(
        &self,
        key: &CompositeKey,
        members: BTreeSet<Member>,
    ) -> Result<bool> {
        self.round_trip(&self.member_removes).await?;
        self.update_item(key, |current| items::remove_members(current, &members))
    }

    async fn query_keys(&self, hash_key: &str) -> Result<BoxStream<'static, Result<String>>> {
        self.round_trip(&self.queries).await?;
        let range_keys: Vec<String> = self
            .existing_partition(hash_key)
            .map(|p| p.iter().map(|item| item.key().clone()).collect())
            .unwrap_or_default();

        debug!(hash_key = %hash_key, items = range_keys.len(), "Scanning partition");
        Ok(stream::iter(range_keys)
            .map(|range_key| CompositeKey::decode_range_key(&range_key))
            .boxed())
    }
}

#[async_trait]
impl TableAdmin for InMemoryDurableStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tables.contains_key(name))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        match self.tables.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(Error::InvalidOperation(format!(
                "table {} already exists",
                spec.name
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(spec.clone());
                Ok(())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
