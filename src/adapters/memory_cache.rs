//! In-Memory Cache Backend
//!
//! Process-local implementation of the volatile cache port. Each entry
//! carries its own expiry; expired entries read as absent and are dropped
//! lazily. `add_if_absent` and `compare_and_swap` run under the DashMap
//! entry lock, so they are atomic with respect to each other.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::ports::CacheBackend;
use crate::domain::value::Value;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Cache backend statistics
#[derive(Debug, Clone, Default)]
pub struct CacheBackendStats {
    pub entries: usize,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub cas_attempts: u64,
    pub cas_failures: u64,
}

/// In-memory cache backend
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, Slot>,
    failing: AtomicBool,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    cas_attempts: AtomicU64,
    cas_failures: AtomicU64,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (fault injection for tests).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheBackendStats {
        CacheBackendStats {
            entries: self.len(),
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            cas_attempts: self.cas_attempts.load(Ordering::Relaxed),
            cas_failures: self.cas_failures.load(Ordering::Relaxed),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::CacheBackend("cache backend unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_available()?;
        self.gets.fetch_add(1, Ordering::Relaxed);

        match self.entries.get(key) {
            Some(slot) if slot.is_live() => return Ok(Some(slot.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // expired
        self.entries.remove_if(key, |_, slot| !slot.is_live());
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(key);
        Ok(())
    }

    async fn add_if_absent(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        self.check_available()?;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    return Ok(false);
                }
                occupied.insert(Slot::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.check_available()?;
        self.cas_attempts.fetch_add(1, Ordering::Relaxed);

        let swapped = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = Some(occupied.get())
                    .filter(|slot| slot.is_live())
                    .map(|slot| &slot.value);
                if current == expected {
                    occupied.insert(Slot::new(new, ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(Slot::new(new, ttl));
                    true
                } else {
                    false
                }
            }
        };

        if !swapped {
            self.cas_failures.fetch_add(1, Ordering::Relaxed);
        }
        Ok(swapped)
    }

    async fn clear(&self) -> Result<()> {
        self.check_available()?;
        self.entries.clear();
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryCacheBackend::new();

        backend.set("k", Value::from("v"), None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(Value::from("v")));

        backend.delete("k").await.unwrap();
        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let backend = InMemoryCacheBackend::new();

        backend
            .set("k", Value::from(1), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(backend.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_add_if_absent() {
        let backend = InMemoryCacheBackend::new();

        assert!(backend.add_if_absent("k", Value::from(1), None).await.unwrap());
        assert!(!backend.add_if_absent("k", Value::from(2), None).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(Value::from(1)));
    }

    #[tokio::test]
    async fn test_add_if_absent_replaces_expired_entry() {
        let backend = InMemoryCacheBackend::new();

        backend
            .add_if_absent("k", Value::from(1), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(backend.add_if_absent("k", Value::from(2), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let backend = InMemoryCacheBackend::new();

        // absent: only an "expect absent" swap lands
        assert!(!backend
            .compare_and_swap("k", Some(&Value::from(0)), Value::from(1), None)
            .await
            .unwrap());
        assert!(backend
            .compare_and_swap("k", None, Value::from(1), None)
            .await
            .unwrap());

        // present: must match the current value
        assert!(!backend
            .compare_and_swap("k", None, Value::from(5), None)
            .await
            .unwrap());
        assert!(!backend
            .compare_and_swap("k", Some(&Value::from(7)), Value::from(5), None)
            .await
            .unwrap());
        assert!(backend
            .compare_and_swap("k", Some(&Value::from(1)), Value::from(2), None)
            .await
            .unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(Value::from(2)));

        let stats = backend.stats();
        assert_eq!(stats.cas_attempts, 5);
        assert_eq!(stats.cas_failures, 3);
    }

    #[tokio::test]
    async fn test_failing_backend_errors() {
        let backend = InMemoryCacheBackend::new();
        backend.set_failing(true);

        assert_matches!(backend.get("k").await, Err(Error::CacheBackend(_)));
        assert_matches!(
            backend.set("k", Value::from(1), None).await,
            Err(Error::CacheBackend(_))
        );

        backend.set_failing(false);
        assert!(backend.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = InMemoryCacheBackend::new();
        for i in 0..10 {
            backend
                .set(&format!("k{}", i), Value::from(i), None)
                .await
                .unwrap();
        }
        assert_eq!(backend.len(), 10);

        backend.clear().await.unwrap();
        assert_eq!(backend.len(), 0);
    }
}
