//! Distributed Tier Module
//!
//! A shared key/value store seen by every instance. [`DistributedStore`]
//! is the raw, fallible backend; [`DistributedTier`] wraps it with a
//! per-call timeout and turns every failure into a miss (reads) or a
//! logged no-op (writes and deletes), so callers never see a store error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::entry::{CacheEntry, Tier};
use crate::cache::key::{CacheKey, CacheNamespace};
use crate::cache::stats::{AtomicTierStats, TierStats};
use crate::error::{CacheError, Result};

/// Default timeout for a single distributed call
pub const DEFAULT_DISTRIBUTED_TIMEOUT: Duration = Duration::from_millis(250);

/// Default budget for a whole prefix delete, which spans many round trips
pub const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(30);

// == Distributed Store ==
/// Backend contract for the shared store. Keys are full storage keys
/// (`"<namespace>:<derived>"`); the store owns TTL bookkeeping.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key starting with `prefix`, returning how many.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

// == In-Memory Store ==
/// Process-shared map standing in for a network store. Cloning shares the
/// underlying map, so several coordinators built from clones behave like
/// instances sharing one remote store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for a full storage key.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }
}

#[async_trait]
impl DistributedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key).map(|entry| entry.is_expired());
        if expired == Some(true) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry::new(value, Tier::Distributed, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// == Distributed Tier ==
/// Timeout-bounded, failure-absorbing view over a [`DistributedStore`].
pub struct DistributedTier {
    store: Arc<dyn DistributedStore>,
    timeout: Duration,
    bulk_timeout: Duration,
    stats: AtomicTierStats,
}

impl DistributedTier {
    pub fn new(store: Arc<dyn DistributedStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            bulk_timeout: DEFAULT_BULK_TIMEOUT.max(timeout),
            stats: AtomicTierStats::default(),
        }
    }

    /// Budget for [`evict_by_prefix`](Self::evict_by_prefix). Never shorter
    /// than the per-call timeout.
    pub fn with_bulk_timeout(mut self, bulk_timeout: Duration) -> Self {
        self.bulk_timeout = bulk_timeout.max(self.timeout);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Runs one store call under the timeout. Any failure is logged,
    /// counted, and returned as `None`.
    async fn guarded<T, F>(&self, op: &'static str, target: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.guarded_for(self.timeout, op, target, call).await
    }

    async fn guarded_for<T, F>(
        &self,
        budget: Duration,
        op: &'static str,
        target: &str,
        call: F,
    ) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome = match tokio::time::timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(budget.as_millis() as u64)),
        };

        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    op,
                    key = %target,
                    backend = self.store.backend_name(),
                    error = %e,
                    "Distributed tier call failed, degrading"
                );
                None
            }
        }
    }

    // == Get ==
    /// Looks up `key`; unavailability reads as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        let storage_key = key.storage_key();
        let value = self
            .guarded("get", &storage_key, self.store.get(&storage_key))
            .await
            .flatten();

        match &value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    // == Put ==
    /// Writes `value` with `ttl`. Returns whether the write landed.
    pub async fn put(&self, key: &CacheKey, value: String, ttl: Duration) -> bool {
        let storage_key = key.storage_key();
        let written = self
            .guarded("put", &storage_key, self.store.put(&storage_key, value, ttl))
            .await
            .is_some();

        if written {
            debug!(key = %storage_key, ttl_ms = ttl.as_millis() as u64, "Distributed tier populated");
        }
        written
    }

    // == Evict ==
    /// Deletes `key`. `None` means the store could not be reached.
    pub async fn evict(&self, key: &CacheKey) -> Option<bool> {
        let storage_key = key.storage_key();
        let removed = self
            .guarded("delete", &storage_key, self.store.delete(&storage_key))
            .await;

        if removed == Some(true) {
            self.stats.record_evictions(1);
        }
        removed
    }

    // == Evict By Prefix ==
    /// Deletes every key of `namespace` under the bulk budget rather than
    /// the per-call timeout. `None` means the store could not be reached.
    pub async fn evict_by_prefix(&self, namespace: &CacheNamespace) -> Option<u64> {
        let prefix = namespace.key_prefix();
        let removed = self
            .guarded_for(
                self.bulk_timeout,
                "delete_by_prefix",
                &prefix,
                self.store.delete_by_prefix(&prefix),
            )
            .await;

        if let Some(count) = removed {
            self.stats.record_evictions(count);
        }
        removed
    }

    pub async fn is_available(&self) -> bool {
        self.guarded("ping", "-", self.store.ping()).await.is_some()
    }

    pub fn stats(&self) -> TierStats {
        self.stats.snapshot()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: &str, derived: &str) -> CacheKey {
        CacheKey::new(CacheNamespace::new(ns).unwrap(), derived)
    }

    /// Store whose every call fails.
    struct DownStore;

    #[async_trait]
    impl DistributedStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(CacheError::TierUnavailable("connection refused".into()))
        }
        async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(CacheError::TierUnavailable("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(CacheError::TierUnavailable("connection refused".into()))
        }
        async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64> {
            Err(CacheError::TierUnavailable("connection refused".into()))
        }
        async fn ping(&self) -> Result<()> {
            Err(CacheError::TierUnavailable("connection refused".into()))
        }
        fn backend_name(&self) -> &'static str {
            "down"
        }
    }

    /// Store that never answers within any reasonable timeout.
    struct SlowStore;

    #[async_trait]
    impl DistributedStore for SlowStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some("late".into()))
        }
        async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64> {
            Ok(0)
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    /// Store whose prefix delete walks several batches, each well under
    /// the per-call timeout but together well over it.
    struct BatchedStore {
        inner: InMemoryStore,
        batches: u32,
        pause: Duration,
    }

    #[async_trait]
    impl DistributedStore for BatchedStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
            self.inner.put(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key).await
        }
        async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
            for _ in 0..self.batches {
                tokio::time::sleep(self.pause).await;
            }
            self.inner.delete_by_prefix(prefix).await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        fn backend_name(&self) -> &'static str {
            "batched"
        }
    }

    #[tokio::test]
    async fn test_memory_store_put_get_delete() {
        let store = InMemoryStore::new();
        store.put("books:1", "v".into(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("books:1").await.unwrap(), Some("v".to_string()));
        assert!(store.delete("books:1").await.unwrap());
        assert!(!store.delete("books:1").await.unwrap());
        assert_eq!(store.get("books:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_ttl() {
        let store = InMemoryStore::new();
        store.put("books:1", "v".into(), Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.get("books:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_prefix_delete() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.put("books:1", "a".into(), ttl).await.unwrap();
        store.put("books:2", "b".into(), ttl).await.unwrap();
        store.put("bookshelves:1", "c".into(), ttl).await.unwrap();

        assert_eq!(store.delete_by_prefix("books:").await.unwrap(), 2);
        assert!(store.contains("bookshelves:1"));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = InMemoryStore::new();
        let b = a.clone();
        a.put("books:1", "v".into(), Duration::from_secs(60)).await.unwrap();
        assert!(b.contains("books:1"));
    }

    #[tokio::test]
    async fn test_tier_round_trip() {
        let tier = DistributedTier::new(Arc::new(InMemoryStore::new()), DEFAULT_DISTRIBUTED_TIMEOUT);
        let k = key("books", "1");

        assert!(tier.put(&k, "v".into(), Duration::from_secs(60)).await);
        assert_eq!(tier.get(&k).await, Some("v".to_string()));
        assert_eq!(tier.evict(&k).await, Some(true));
        assert_eq!(tier.get(&k).await, None);

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        let tier = DistributedTier::new(Arc::new(DownStore), DEFAULT_DISTRIBUTED_TIMEOUT);
        let k = key("books", "1");

        assert_eq!(tier.get(&k).await, None);
        assert!(!tier.put(&k, "v".into(), Duration::from_secs(60)).await);
        assert_eq!(tier.evict(&k).await, None);
        assert_eq!(tier.evict_by_prefix(k.namespace()).await, None);
        assert!(!tier.is_available().await);
        assert_eq!(tier.stats().failures, 5);
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let tier = DistributedTier::new(Arc::new(SlowStore), Duration::from_millis(20));
        let k = key("books", "1");

        assert_eq!(tier.get(&k).await, None);
        assert!(!tier.put(&k, "v".into(), Duration::from_secs(60)).await);
        assert_eq!(tier.stats().failures, 2);
    }

    #[tokio::test]
    async fn test_prefix_delete_outlasts_per_call_timeout() {
        let inner = InMemoryStore::new();
        let store = BatchedStore {
            inner: inner.clone(),
            batches: 4,
            pause: Duration::from_millis(15),
        };
        let tier = DistributedTier::new(Arc::new(store), Duration::from_millis(20))
            .with_bulk_timeout(Duration::from_secs(2));
        let a = key("books", "1");
        let b = key("books", "2");
        assert!(tier.put(&a, "v".into(), Duration::from_secs(60)).await);
        assert!(tier.put(&b, "v".into(), Duration::from_secs(60)).await);

        assert_eq!(tier.evict_by_prefix(a.namespace()).await, Some(2));
        assert!(inner.is_empty());
        assert_eq!(tier.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_prefix_delete_bulk_budget_still_bounded() {
        let store = BatchedStore {
            inner: InMemoryStore::new(),
            batches: 10,
            pause: Duration::from_millis(50),
        };
        let tier = DistributedTier::new(Arc::new(store), Duration::from_millis(20))
            .with_bulk_timeout(Duration::from_millis(100));

        assert_eq!(tier.evict_by_prefix(key("books", "1").namespace()).await, None);
        assert_eq!(tier.stats().failures, 1);
    }
}
