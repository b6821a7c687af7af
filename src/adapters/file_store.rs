//! File-backed Durable Store
//!
//! Keeps each table as one JSON document under a data directory:
//!
//! ```text
//! <data_dir>/<table>.json
//! {
//!   "spec":  { "name": "tiermap", "hash_key_name": "table", ... },
//!   "items": { "<hash_key>": { "<range_key>": <value>, ... }, ... }
//! }
//! ```
//!
//! Every mutation rewrites the document through a temp file and a rename,
//! so a crash leaves either the old or the new table on disk. Operations
//! are serialised by an async mutex; this store is meant for the CLI and
//! for single-process deployments, not for shared access.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::items;
use crate::domain::key::CompositeKey;
use crate::domain::ports::{DurableStore, TableAdmin, TableSpec};
use crate::domain::value::{Member, Number, Value};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFile {
    spec: TableSpec,
    #[serde(default)]
    items: BTreeMap<String, BTreeMap<String, Value>>,
}

impl TableFile {
    fn new(spec: TableSpec) -> Self {
        Self {
            spec,
            items: BTreeMap::new(),
        }
    }

    fn item(&self, key: &CompositeKey) -> Option<&Value> {
        self.items
            .get(key.hash_key())
            .and_then(|partition| partition.get(key.range_key()))
    }

    fn store(&mut self, key: &CompositeKey, value: Value) {
        self.items
            .entry(key.hash_key().to_string())
            .or_default()
            .insert(key.range_key().to_string(), value);
    }

    fn remove(&mut self, key: &CompositeKey) -> bool {
        let Some(partition) = self.items.get_mut(key.hash_key()) else {
            return false;
        };
        let removed = partition.remove(key.range_key()).is_some();
        if partition.is_empty() {
            self.items.remove(key.hash_key());
        }
        removed
    }
}

/// Durable store persisted as JSON files
#[derive(Debug)]
pub struct FileDurableStore {
    data_dir: PathBuf,
    table: String,
    lock: Mutex<()>,
}

impl FileDurableStore {
    /// Store for `table` under `data_dir`. The table itself is created
    /// through [`TableAdmin::create_table`].
    pub fn new(data_dir: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            table: table.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", name))
    }

    async fn load(&self) -> Result<TableFile> {
        let path = self.table_path(&self.table);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DurableUnavailable(format!(
                    "table {} does not exist in {}",
                    self.table,
                    self.data_dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, name: &str, table: &TableFile) -> Result<()> {
        let path = self.table_path(name);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(table)?;

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Table file written");
        Ok(())
    }

    /// Load, mutate and write back the table under the store lock.
    async fn modify<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut TableFile) -> Result<bool> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        if mutate(&mut table)? {
            self.save(&self.table, &table).await?;
        }
        Ok(())
    }

    /// Returns whether the item exists afterwards.
    async fn update_item<F>(&self, key: &CompositeKey, update: F) -> Result<bool>
    where
        F: FnOnce(Option<&Value>) -> Result<Option<Value>> + Send,
    {
        let mut exists = false;
        self.modify(|table| {
            let next = update(table.item(key))?;
            exists = next.is_some() || table.item(key).is_some();
            match next {
                Some(next) => {
                    table.store(key, next);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn get(&self, key: &CompositeKey) -> Result<Value> {
        let _guard = self.lock.lock().await;
        let table = self.load().await?;
        table
            .item(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key.map_name(), key.original_key()))
    }

    async fn put(&self, key: &CompositeKey, value: Value) -> Result<()> {
        items::check_storable(&value)?;
        self.modify(|table| {
            table.store(key, value);
            Ok(true)
        })
        .await
    }

    async fn delete(&self, key: &CompositeKey) -> Result<()> {
        self.modify(|table| Ok(table.remove(key))).await
    }

    async fn add_numeric(&self, key: &CompositeKey, delta: Number) -> Result<()> {
        self.update_item(key, |current| items::add_numeric(current, delta).map(Some))
            .await?;
        Ok(())
    }

    async fn add_members(&self, key: &CompositeKey, members: BTreeSet<Member>) -> Result<bool> {
        self.update_item(key, |current| items::add_members(current, &members))
            .await
    }

    async fn remove_members(
        &self,
        key: &CompositeKey,
        members: BTreeSet<Member>,
    ) -> Result<bool> {
        self.update_item(key, |current| items::remove_members(current, &members))
            .await
    }

    async fn query_keys(&self, hash_key: &str) -> Result<BoxStream<'static, Result<String>>> {
        let _guard = self.lock.lock().await;
        let table = self.load().await?;
        let range_keys: Vec<String> = table
            .items
            .get(hash_key)
            .map(|partition| partition.keys().cloned().collect())
            .unwrap_or_default();

        Ok(stream::iter(range_keys)
            .map(|range_key| CompositeKey::decode_range_key(&range_key))
            .boxed())
    }
}

#[async_trait]
impl TableAdmin for FileDurableStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.table_path(name)).await?)
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.table_exists(&spec.name).await? {
            return Err(Error::InvalidOperation(format!(
                "table {} already exists",
                spec.name
            )));
        }

        tokio::fs::create_dir_all(&self.data_dir).await?;
        self.save(&spec.name, &TableFile::new(spec.clone())).await?;
        info!(
            table = %spec.name,
            read_units = spec.read_units,
            write_units = spec.write_units,
            "Table created"
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::{member_set, EMPTY_SET_SENTINEL};
    use assert_matches::assert_matches;
    use futures::TryStreamExt;

    fn key(k: &str) -> CompositeKey {
        CompositeKey::derive("orders", k, false).unwrap()
    }

    async fn provisioned(dir: &Path) -> FileDurableStore {
        let store = FileDurableStore::new(dir, "tiermap");
        store.create_table(&TableSpec::new("tiermap")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_table_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDurableStore::new(dir.path(), "tiermap");

        assert_matches!(
            store.get(&key("a")).await,
            Err(Error::DurableUnavailable(_))
        );
        assert_matches!(
            store.put(&key("a"), Value::from(1)).await,
            Err(Error::DurableUnavailable(_))
        );
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = provisioned(dir.path()).await;

        store.put(&key("a"), Value::from(123)).await.unwrap();
        store.put(&key("b"), Value::from(1.5)).await.unwrap();
        store.put(&key("c"), Value::set(["x", "y"])).await.unwrap();
        drop(store);

        let reopened = FileDurableStore::new(dir.path(), "tiermap");
        assert_eq!(reopened.get(&key("a")).await.unwrap(), Value::from(123));
        assert_eq!(reopened.get(&key("b")).await.unwrap(), Value::from(1.5));
        assert_eq!(
            reopened.get(&key("c")).await.unwrap(),
            Value::set(["x", "y"])
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = provisioned(dir.path()).await;

        store.put(&key("a"), Value::from("v")).await.unwrap();
        store.delete(&key("a")).await.unwrap();
        store.delete(&key("a")).await.unwrap();
        assert_matches!(store.get(&key("a")).await, Err(Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_numeric_and_member_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = provisioned(dir.path()).await;

        store.add_numeric(&key("n"), Number::Int(2)).await.unwrap();
        store.add_numeric(&key("n"), Number::Int(3)).await.unwrap();
        assert_eq!(store.get(&key("n")).await.unwrap(), Value::from(5));

        let exists = store
            .remove_members(&key("s"), member_set(["a"]))
            .await
            .unwrap();
        assert!(!exists);

        store
            .add_members(&key("s"), member_set(["a"]))
            .await
            .unwrap();
        let exists = store
            .remove_members(&key("s"), member_set(["a"]))
            .await
            .unwrap();
        assert!(exists);
        assert_eq!(
            store.get(&key("s")).await.unwrap(),
            Value::from(EMPTY_SET_SENTINEL)
        );
    }

    #[tokio::test]
    async fn test_query_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = provisioned(dir.path()).await;

        let tuple_key = CompositeKey::derive("orders", &("eu", 7), false).unwrap();
        store.put(&key("a"), Value::from(1)).await.unwrap();
        store.put(&tuple_key, Value::from(2)).await.unwrap();

        let mut keys: Vec<String> = store
            .query_keys("orders")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        keys.sort();
        assert_eq!(keys, vec![r#"["eu",7]"#.to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_create_table_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = provisioned(dir.path()).await;

        assert!(store.table_exists("tiermap").await.unwrap());
        assert_matches!(
            store.create_table(&TableSpec::new("tiermap")).await,
            Err(Error::InvalidOperation(_))
        );
    }
}
