//! Integration tests for tiermap
//!
//! These tests drive the maps end to end over the in-memory and
//! file-backed adapters, counting durable-tier calls where the protocol
//! promises a bound.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::TryStreamExt;
use proptest::prelude::*;

use tiermap::adapters::{
    FileDurableStore, InMemoryCacheBackend, InMemoryDurableStore, InMemoryUpdateCollector,
};
use tiermap::domain::ports::{CacheBackend, TableSpec};
use tiermap::domain::value::{member_set, Member, EMPTY_SET_SENTINEL};
use tiermap::domain::UpdatePhase;
use tiermap::{
    provision_table, Error, MapConfig, MapContext, ModePolicy, RunMode, TouchedKeyTracker, Value,
};

// =============================================================================
// Fixtures
// =============================================================================

struct Tiers {
    cache: Arc<InMemoryCacheBackend>,
    durable: Arc<InMemoryDurableStore>,
    ctx: MapContext,
}

fn tiers_with(config: MapConfig, durable: InMemoryDurableStore) -> Tiers {
    let cache = Arc::new(InMemoryCacheBackend::new());
    let durable = Arc::new(durable);
    let ctx = MapContext::new(cache.clone(), durable.clone(), config)
        .unwrap()
        .with_key_index();
    Tiers {
        cache,
        durable,
        ctx,
    }
}

fn fast_config() -> MapConfig {
    MapConfig::default()
        .with_stampede_token_ttl(Duration::from_millis(30))
        .with_stampede_wait(Duration::from_millis(5))
}

fn durable_backed() -> Tiers {
    tiers_with(fast_config(), InMemoryDurableStore::new())
}

fn cache_only() -> Tiers {
    tiers_with(fast_config().with_cache_only(true), InMemoryDurableStore::new())
}

// =============================================================================
// Read / Write Protocol
// =============================================================================

#[tokio::test]
async fn test_orders_scenario_reads_durable_once_after_eviction() {
    let t = durable_backed();
    let orders = t.ctx.map("orders").unwrap();

    orders.set("a", 123).await.unwrap();
    orders.set("b", "x").await.unwrap();
    t.cache.clear().await.unwrap();

    assert_eq!(orders.get("a").await.unwrap(), Value::from(123));
    assert_eq!(t.durable.stats().gets, 1);

    assert_eq!(orders.get("a").await.unwrap(), Value::from(123));
    assert_eq!(t.durable.stats().gets, 1);

    let metrics = t.ctx.metrics().snapshot();
    assert_eq!(metrics.durable_fetches, 1);
    assert_eq!(metrics.cache_hits, 1);
}

#[tokio::test]
async fn test_round_trip_for_every_value_type() {
    let t = durable_backed();
    let plain = t.ctx.map("plain").unwrap();
    let sets = t.ctx.set_map("sets").unwrap();

    let values = vec![
        Value::from("text"),
        Value::from(""),
        Value::from(-42),
        Value::from(i64::MAX),
        Value::from(3.25),
        Value::set(["a", "b"]),
        Value::set([1, 2, 3]),
    ];

    for (i, value) in values.iter().enumerate() {
        plain.set(&i, value.clone()).await.unwrap();
        assert_eq!(&plain.get(&i).await.unwrap(), value);
    }
    sets.set("mixed", member_set([Member::Int(1), Member::from("one")]))
        .await
        .unwrap();

    t.cache.clear().await.unwrap();

    for (i, value) in values.iter().enumerate() {
        assert_eq!(&plain.get(&i).await.unwrap(), value);
    }
    assert_eq!(
        sets.get("mixed").await.unwrap(),
        member_set([Member::Int(1), Member::from("one")])
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    for t in [durable_backed(), cache_only()] {
        let map = t.ctx.map("m").unwrap();

        map.delete("never-written").await.unwrap();
        map.set("k", 1).await.unwrap();
        map.delete("k").await.unwrap();
        map.delete("k").await.unwrap();
        assert_matches!(map.get("k").await, Err(Error::NotFound { .. }));
    }
}

#[tokio::test]
async fn test_set_map_default_is_empty_set() {
    for t in [durable_backed(), cache_only()] {
        let tags = t.ctx.set_map("tags").unwrap();
        assert_eq!(tags.get("never-written").await.unwrap(), BTreeSet::new());
    }
}

#[tokio::test]
async fn test_sentinel_transparency() {
    let t = durable_backed();
    let tags = t.ctx.set_map("tags").unwrap();
    let plain = t.ctx.map("plain").unwrap();

    tags.set("k", BTreeSet::<Member>::new()).await.unwrap();
    plain.set("k", EMPTY_SET_SENTINEL).await.unwrap();
    t.cache.clear().await.unwrap();

    assert_eq!(tags.get("k").await.unwrap(), BTreeSet::new());
    assert_eq!(plain.get("k").await.unwrap(), Value::from(EMPTY_SET_SENTINEL));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stampede_bound_single_durable_fetch() {
    let config = MapConfig::default().with_stampede_wait(Duration::from_millis(10));
    let t = tiers_with(
        config,
        InMemoryDurableStore::new().with_latency(Duration::from_millis(50)),
    );
    let map = Arc::new(t.ctx.map("hot").unwrap());

    map.set("key", "value").await.unwrap();
    t.cache.clear().await.unwrap();
    let gets_before = t.durable.stats().gets;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let map = Arc::clone(&map);
        handles.push(tokio::spawn(async move { map.get("key").await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Value::from("value"));
    }
    assert_eq!(t.durable.stats().gets - gets_before, 1);
    assert!(t.ctx.metrics().stampede_waits() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counters_converge() {
    for t in [durable_backed(), cache_only()] {
        let counters = Arc::new(t.ctx.map("counters").unwrap());

        let mut handles = Vec::new();
        for _ in 0..100 {
            let counters = Arc::clone(&counters);
            handles.push(tokio::spawn(
                async move { counters.increment("n", 1).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(counters.get("n").await.unwrap(), Value::from(100));
    }
}

// =============================================================================
// Modes and Failures
// =============================================================================

#[tokio::test]
async fn test_disable_caching_reads_durable_every_time() {
    let t = durable_backed();
    let mut map = t.ctx.map("m").unwrap();
    map.set("k", 5).await.unwrap();

    map.disable_caching().unwrap();
    for _ in 0..3 {
        assert_eq!(map.get("k").await.unwrap(), Value::from(5));
    }
    assert_eq!(t.durable.stats().gets, 3);

    let mut local = cache_only().ctx.map("m").unwrap();
    assert_matches!(local.disable_caching(), Err(Error::InvalidOperation(_)));
}

#[tokio::test]
async fn test_value_too_large_is_rejected_without_side_effects() {
    let t = tiers_with(
        fast_config().with_max_value_bytes(16),
        InMemoryDurableStore::new(),
    );
    let collector = Arc::new(InMemoryUpdateCollector::new());
    t.ctx.subscribe(collector.clone());
    let map = t.ctx.map("m").unwrap();

    let result = map.set("k", "x".repeat(17)).await;
    assert_matches!(result, Err(Error::ValueTooLarge { size: 17, limit: 16 }));
    assert!(collector.is_empty());
    assert!(t.cache.is_empty());
    assert!(t.durable.is_empty());

    // cache-only maps are not bound by the durable item size
    let local = tiers_with(
        fast_config().with_max_value_bytes(16).with_cache_only(true),
        InMemoryDurableStore::new(),
    );
    local.ctx.map("m").unwrap().set("k", "x".repeat(17)).await.unwrap();
}

#[tokio::test]
async fn test_durable_unavailable_is_fatal_for_writes_and_misses() {
    let t = durable_backed();
    let map = t.ctx.map("m").unwrap();
    map.set("cached", 1).await.unwrap();

    t.durable.set_available(false);
    assert_matches!(map.set("k", 1).await, Err(Error::DurableUnavailable(_)));
    assert_matches!(map.get("uncached").await, Err(Error::DurableUnavailable(_)));

    // cache hits still work without the durable tier
    assert_eq!(map.get("cached").await.unwrap(), Value::from(1));
}

#[tokio::test]
async fn test_cache_outage_degrades_to_durable() {
    let t = durable_backed();
    let map = t.ctx.map("m").unwrap();

    t.cache.set_failing(true);
    map.set("k", "v").await.unwrap();
    assert_eq!(map.get("k").await.unwrap(), Value::from("v"));
    assert_eq!(map.get("k").await.unwrap(), Value::from("v"));
    assert_eq!(t.durable.stats().gets, 2);

    t.cache.set_failing(false);
    assert!(t.ctx.metrics().cache_errors() >= 4);
}

#[tokio::test]
async fn test_test_namespace_isolates_keys() {
    let cache = Arc::new(InMemoryCacheBackend::new());
    let durable = Arc::new(InMemoryDurableStore::new());
    let prod = MapContext::new(cache.clone(), durable.clone(), fast_config()).unwrap();
    let test = MapContext::new(
        cache.clone(),
        durable.clone(),
        fast_config().with_test_namespace(true),
    )
    .unwrap();

    prod.map("orders").unwrap().set("a", "prod").await.unwrap();
    test.map("orders").unwrap().set("a", "test").await.unwrap();
    cache.clear().await.unwrap();

    assert_eq!(
        prod.map("orders").unwrap().get("a").await.unwrap(),
        Value::from("prod")
    );
    assert_eq!(
        test.map("orders").unwrap().get("a").await.unwrap(),
        Value::from("test")
    );
    assert_eq!(durable.len(), 2);
}

// =============================================================================
// Notifications, Index and Cleanup
// =============================================================================

#[tokio::test]
async fn test_every_mutation_is_bracketed_by_notifications() {
    let t = cache_only();
    let collector = Arc::new(InMemoryUpdateCollector::new());
    t.ctx.subscribe(collector.clone());
    let map = t.ctx.map("m").unwrap();
    let tags = t.ctx.set_map("tags").unwrap();

    map.set("a", 1).await.unwrap();
    map.increment("a", 1).await.unwrap();
    map.delete("a").await.unwrap();
    tags.insert_values("t", ["x"]).await.unwrap();
    tags.remove_values("t", ["x"]).await.unwrap();

    assert_eq!(collector.events_in_phase(UpdatePhase::PreUpdate).len(), 5);
    assert_eq!(collector.events_in_phase(UpdatePhase::PostUpdate).len(), 5);
    for pair in collector.events().chunks(2) {
        assert_eq!(pair[0].phase, UpdatePhase::PreUpdate);
        assert_eq!(pair[1].phase, UpdatePhase::PostUpdate);
        assert_eq!(pair[0].action, pair[1].action);
    }
}

#[tokio::test]
async fn test_index_matches_durable_scan() {
    let t = durable_backed();
    let map = t.ctx.map("m").unwrap();

    for key in ["a", "b", "c", "d"] {
        map.set(key, key).await.unwrap();
    }
    map.delete("b").await.unwrap();
    map.increment("e", 1).await.unwrap();

    let indexed = map.keys().await.unwrap();
    let mut scanned: Vec<String> = map.scan_keys().await.unwrap().try_collect().await.unwrap();
    scanned.sort();

    assert_eq!(indexed, vec!["a", "c", "d", "e"]);
    assert_eq!(indexed, scanned);
}

#[tokio::test]
async fn test_touched_key_cleanup() {
    let config = MapConfig::for_mode(RunMode::Test, ModePolicy::default());
    let ctx = MapContext::in_memory(config).unwrap().with_key_index();
    let tracker = TouchedKeyTracker::bind(&ctx).unwrap();

    let map = ctx.map("scratch").unwrap();
    map.set("a", 1).await.unwrap();
    map.set("b", 2).await.unwrap();
    assert_eq!(tracker.full_clean_up(&ctx).await.unwrap(), 2);

    assert!(map.keys().await.unwrap().is_empty());
    assert!(!map.contains("a").await.unwrap());

    let prod = MapContext::in_memory(MapConfig::default()).unwrap();
    assert_matches!(
        TouchedKeyTracker::bind(&prod),
        Err(Error::InvalidOperation(_))
    );
}

// =============================================================================
// File-backed Store
// =============================================================================

#[tokio::test]
async fn test_file_store_survives_new_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileDurableStore::new(dir.path(), "tiermap");
    provision_table(&store, &TableSpec::new("tiermap"))
        .await
        .unwrap();

    {
        let ctx = MapContext::new(
            Arc::new(InMemoryCacheBackend::new()),
            Arc::new(store),
            fast_config(),
        )
        .unwrap();
        let map = ctx.map("orders").unwrap();
        map.set("a", 123).await.unwrap();
        map.increment("hits", 2).await.unwrap();
        ctx.set_map("tags")
            .unwrap()
            .insert_values("t", ["x", "y"])
            .await
            .unwrap();
    }

    let ctx = MapContext::new(
        Arc::new(InMemoryCacheBackend::new()),
        Arc::new(FileDurableStore::new(dir.path(), "tiermap")),
        fast_config(),
    )
    .unwrap();
    let map = ctx.map("orders").unwrap();
    assert_eq!(map.get("a").await.unwrap(), Value::from(123));
    assert_eq!(map.get("hits").await.unwrap(), Value::from(2));
    assert_eq!(
        ctx.set_map("tags").unwrap().get("t").await.unwrap(),
        member_set(["x", "y"])
    );
}

#[tokio::test]
async fn test_file_store_without_table_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = MapContext::new(
        Arc::new(InMemoryCacheBackend::new()),
        Arc::new(FileDurableStore::new(dir.path(), "tiermap")),
        fast_config(),
    )
    .unwrap();

    assert_matches!(
        ctx.map("m").unwrap().set("k", 1).await,
        Err(Error::DurableUnavailable(_))
    );
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Put(u8, i64),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, any::<i64>()).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..8).prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After any sequence of puts and deletes, iterating the map yields
    /// exactly the live keys, and every live key reads its last value.
    #[test]
    fn prop_index_tracks_live_keys(ops in prop::collection::vec(op_strategy(), 0..40)) {
        tokio_test::block_on(async {
            let t = cache_only();
            let map = t.ctx.map("m").unwrap();
            let mut model = std::collections::BTreeMap::new();

            for op in &ops {
                match op {
                    Op::Put(k, v) => {
                        map.set(&k.to_string(), *v).await.unwrap();
                        model.insert(k.to_string(), *v);
                    }
                    Op::Delete(k) => {
                        map.delete(&k.to_string()).await.unwrap();
                        model.remove(&k.to_string());
                    }
                }
            }

            let expected: Vec<String> = model.keys().cloned().collect();
            assert_eq!(map.keys().await.unwrap(), expected);
            for (k, v) in &model {
                assert_eq!(map.get(k).await.unwrap(), Value::from(*v));
            }
        });
    }
}
