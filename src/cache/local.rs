//! Local Tier Module
//!
//! In-process cache bounded by entry count (LRU) and per-entry TTL.
//! Entries are indexed by namespace so a namespace clear never scans
//! unrelated keys. Every method is synchronous and takes a short
//! non-async lock, so it is safe to call from any task or thread.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::entry::{CacheEntry, Tier};
use crate::cache::key::{CacheKey, CacheNamespace};
use crate::cache::lru::LruTracker;
use crate::cache::stats::TierStats;

#[derive(Debug)]
struct Slot {
    namespace: CacheNamespace,
    entry: CacheEntry,
}

#[derive(Debug)]
struct LocalStore {
    /// storage key -> entry
    entries: HashMap<String, Slot>,
    /// namespace -> storage keys currently held
    by_namespace: HashMap<CacheNamespace, HashSet<String>>,
    lru: LruTracker,
    stats: TierStats,
    max_entries: usize,
}

impl LocalStore {
    fn remove(&mut self, storage_key: &str) -> Option<Slot> {
        let slot = self.entries.remove(storage_key)?;
        self.lru.remove(storage_key);
        if let Some(keys) = self.by_namespace.get_mut(&slot.namespace) {
            keys.remove(storage_key);
            if keys.is_empty() {
                self.by_namespace.remove(&slot.namespace);
            }
        }
        Some(slot)
    }

    fn sync_entry_count(&mut self) {
        let len = self.entries.len();
        self.stats.set_entries(len);
    }
}

// == Local Tier ==
/// Process-local cache tier.
#[derive(Debug)]
pub struct LocalTier {
    store: Mutex<LocalStore>,
}

impl LocalTier {
    // == Constructor ==
    /// Creates a local tier holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Mutex::new(LocalStore {
                entries: HashMap::new(),
                by_namespace: HashMap::new(),
                lru: LruTracker::new(),
                stats: TierStats::new(),
                max_entries,
            }),
        }
    }

    // == Get ==
    /// Returns the live value for `key`. An expired entry is removed and
    /// reported as a miss, never returned.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let storage_key = key.storage_key();
        let mut store = self.store.lock();

        let expired = store
            .entries
            .get(&storage_key)
            .map(|slot| slot.entry.is_expired());

        let Some(expired) = expired else {
            store.stats.record_miss();
            return None;
        };

        if expired {
            store.remove(&storage_key);
            store.sync_entry_count();
            store.stats.record_miss();
            return None;
        }

        store.stats.record_hit();
        store.lru.touch(&storage_key);
        store.entries.get(&storage_key).map(|slot| slot.entry.value.clone())
    }

    // == Put ==
    /// Stores `value` under `key` for `ttl`, overwriting any previous
    /// entry. Evicts the least recently used entry when full.
    pub fn put(&self, key: &CacheKey, value: String, ttl: Duration) {
        let storage_key = key.storage_key();
        let mut store = self.store.lock();

        let is_overwrite = store.entries.contains_key(&storage_key);
        if !is_overwrite && store.entries.len() >= store.max_entries {
            match store.lru.evict_oldest() {
                Some(victim) => {
                    store.remove(&victim);
                    store.stats.record_evictions(1);
                    debug!(key = %victim, "Local tier full, evicted LRU entry");
                }
                None => {
                    debug!(key = %storage_key, "Local tier has zero capacity, skipping put");
                    return;
                }
            }
        }

        let namespace = key.namespace().clone();
        store
            .by_namespace
            .entry(namespace.clone())
            .or_default()
            .insert(storage_key.clone());
        store.entries.insert(
            storage_key.clone(),
            Slot {
                namespace,
                entry: CacheEntry::new(value, Tier::Local, ttl),
            },
        );
        store.lru.touch(&storage_key);
        store.sync_entry_count();
    }

    // == Evict ==
    /// Removes `key`. Returns whether an entry was present; evicting a
    /// missing key is a no-op.
    pub fn evict(&self, key: &CacheKey) -> bool {
        let mut store = self.store.lock();
        let removed = store.remove(&key.storage_key()).is_some();
        if removed {
            store.stats.record_evictions(1);
            store.sync_entry_count();
        }
        removed
    }

    // == Clear ==
    /// Removes every entry of `namespace`, leaving other namespaces intact.
    /// Returns the number of entries removed.
    pub fn clear(&self, namespace: &CacheNamespace) -> usize {
        let mut store = self.store.lock();
        let keys = store.by_namespace.remove(namespace).unwrap_or_default();
        for storage_key in &keys {
            store.entries.remove(storage_key);
            store.lru.remove(storage_key);
        }
        store.stats.record_evictions(keys.len() as u64);
        store.sync_entry_count();
        keys.len()
    }

    /// Removes every entry of every namespace.
    pub fn clear_all(&self) -> usize {
        let mut store = self.store.lock();
        let count = store.entries.len();
        store.entries.clear();
        store.by_namespace.clear();
        store.lru.clear();
        store.stats.record_evictions(count as u64);
        store.sync_entry_count();
        count
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut store = self.store.lock();
        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove(key);
        }
        store.sync_entry_count();
        expired.len()
    }

    /// Whether a live entry exists, without touching LRU order or stats.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let store = self.store.lock();
        store
            .entries
            .get(&key.storage_key())
            .is_some_and(|slot| !slot.entry.is_expired())
    }

    pub fn stats(&self) -> TierStats {
        let store = self.store.lock();
        let mut stats = store.stats.clone();
        stats.set_entries(store.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn key(ns: &str, derived: &str) -> CacheKey {
        CacheKey::new(CacheNamespace::new(ns).unwrap(), derived)
    }

    #[test]
    fn test_put_and_get() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "v1".to_string(), TTL);

        assert_eq!(tier.get(&key("books", "1")), Some("v1".to_string()));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let tier = LocalTier::new(100);
        assert_eq!(tier.get(&key("books", "nope")), None);
        assert_eq!(tier.stats().misses, 1);
    }

    #[test]
    fn test_overwrite() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "v1".to_string(), TTL);
        tier.put(&key("books", "1"), "v2".to_string(), TTL);

        assert_eq!(tier.get(&key("books", "1")), Some("v2".to_string()));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_expired_entry_never_returned() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "v1".to_string(), Duration::from_millis(50));
        assert!(tier.get(&key("books", "1")).is_some());

        sleep(Duration::from_millis(80));

        assert!(!tier.contains(&key("books", "1")));
        assert_eq!(tier.get(&key("books", "1")), None);
        assert!(tier.is_empty());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "v1".to_string(), TTL);

        assert!(tier.evict(&key("books", "1")));
        assert!(!tier.evict(&key("books", "1")));
        assert_eq!(tier.get(&key("books", "1")), None);
    }

    #[test]
    fn test_clear_only_touches_namespace() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "b1".to_string(), TTL);
        tier.put(&key("books", "2"), "b2".to_string(), TTL);
        tier.put(&key("categories", "1"), "c1".to_string(), TTL);

        let removed = tier.clear(&CacheNamespace::new("books").unwrap());

        assert_eq!(removed, 2);
        assert_eq!(tier.get(&key("books", "1")), None);
        assert_eq!(tier.get(&key("categories", "1")), Some("c1".to_string()));
    }

    #[test]
    fn test_clear_unknown_namespace() {
        let tier = LocalTier::new(100);
        assert_eq!(tier.clear(&CacheNamespace::new("authors").unwrap()), 0);
    }

    #[test]
    fn test_lru_eviction() {
        let tier = LocalTier::new(3);
        tier.put(&key("books", "1"), "v".to_string(), TTL);
        tier.put(&key("books", "2"), "v".to_string(), TTL);
        tier.put(&key("books", "3"), "v".to_string(), TTL);

        // key 1 becomes most recently used, so 2 is the victim
        tier.get(&key("books", "1"));
        tier.put(&key("books", "4"), "v".to_string(), TTL);

        assert_eq!(tier.len(), 3);
        assert!(tier.contains(&key("books", "1")));
        assert!(!tier.contains(&key("books", "2")));
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn test_lru_victim_leaves_namespace_index() {
        let tier = LocalTier::new(1);
        tier.put(&key("books", "1"), "v".to_string(), TTL);
        tier.put(&key("categories", "1"), "v".to_string(), TTL);

        assert_eq!(tier.clear(&CacheNamespace::new("books").unwrap()), 0);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_zero_capacity() {
        let tier = LocalTier::new(0);
        tier.put(&key("books", "1"), "v".to_string(), TTL);
        assert!(tier.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "short"), "v".to_string(), Duration::from_millis(50));
        tier.put(&key("books", "long"), "v".to_string(), TTL);

        sleep(Duration::from_millis(80));

        assert_eq!(tier.cleanup_expired(), 1);
        assert_eq!(tier.len(), 1);
        assert!(tier.contains(&key("books", "long")));
    }

    #[test]
    fn test_clear_all() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "v".to_string(), TTL);
        tier.put(&key("categories", "1"), "v".to_string(), TTL);

        assert_eq!(tier.clear_all(), 2);
        assert!(tier.is_empty());
    }

    #[test]
    fn test_stats() {
        let tier = LocalTier::new(100);
        tier.put(&key("books", "1"), "v".to_string(), TTL);
        tier.get(&key("books", "1"));
        tier.get(&key("books", "2"));

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let tier = Arc::new(LocalTier::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tier = Arc::clone(&tier);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let k = key("books", &format!("{t}-{i}"));
                        tier.put(&k, i.to_string(), TTL);
                        assert_eq!(tier.get(&k), Some(i.to_string()));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tier.len(), 800);
    }
}
