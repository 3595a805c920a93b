//! Tiered Cache Coordinator
//!
//! Implements the read-through, write-through and eviction protocols over
//! the local and distributed tiers.
//!
//! # Tier precedence
//! ```text
//! read:  LocalTier ──miss──► DistributedTier ──miss──► operation
//!            ▲                     │ hit                   │ Ok(non-empty)
//!            └──── backfill ◄──────┘                       ▼
//!                                           DistributedTier, then LocalTier
//! ```
//!
//! Caching never changes what a caller sees: the wrapped operation's value
//! or error is returned unchanged, and every tier or bus failure degrades
//! to a miss or a no-op.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::distributed::{
    DistributedStore, DistributedTier, DEFAULT_BULK_TIMEOUT, DEFAULT_DISTRIBUTED_TIMEOUT,
};
use crate::cache::entry::Tier;
use crate::cache::interception::EvictTiming;
use crate::cache::invalidation::{InvalidationBus, InvalidationMessage};
use crate::cache::key::{CacheKey, CacheNamespace};
use crate::cache::local::LocalTier;
use crate::cache::policy::{PolicyRegistry, TierPolicy};
use crate::cache::stats::{CacheStats, CoordinatorCounters};
use crate::error::CacheError;

// == Eviction Target ==
/// What an eviction call removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictTarget {
    /// A single derived key
    Key(CacheKey),
    /// Every entry of a namespace
    Namespace(CacheNamespace),
}

// == Eviction Report ==
/// Outcome of an eviction across both tiers and the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Entries removed from this instance's local tier
    pub local_removed: usize,
    /// Entries removed from the distributed tier; `None` if unreachable
    pub distributed_removed: Option<u64>,
    /// Whether the invalidation message was handed to the bus
    pub published: bool,
}

// == Coordinator Builder ==
/// Explicit construction of a coordinator; there is no global instance.
pub struct CoordinatorBuilder {
    instance_id: String,
    local: Arc<LocalTier>,
    store: Arc<dyn DistributedStore>,
    bus: Arc<dyn InvalidationBus>,
    policies: PolicyRegistry,
    distributed_timeout: Duration,
    bulk_timeout: Duration,
    apply_own_invalidations: bool,
}

impl CoordinatorBuilder {
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// Timeout applied to every distributed store call and bus publish.
    pub fn distributed_timeout(mut self, timeout: Duration) -> Self {
        self.distributed_timeout = timeout;
        self
    }

    /// Budget for a namespace-wide delete in the distributed tier.
    pub fn bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    /// Whether messages this instance published are applied when they come
    /// back over the bus. Off by default: the originator already evicted.
    pub fn apply_own_invalidations(mut self, apply: bool) -> Self {
        self.apply_own_invalidations = apply;
        self
    }

    pub fn build(self) -> TieredCacheCoordinator {
        TieredCacheCoordinator {
            instance_id: self.instance_id,
            local: self.local,
            distributed: DistributedTier::new(self.store, self.distributed_timeout)
                .with_bulk_timeout(self.bulk_timeout),
            bus: self.bus,
            policies: self.policies,
            bus_timeout: self.distributed_timeout,
            apply_own_invalidations: self.apply_own_invalidations,
            counters: CoordinatorCounters::default(),
        }
    }
}

// == Tiered Cache Coordinator ==
pub struct TieredCacheCoordinator {
    instance_id: String,
    local: Arc<LocalTier>,
    distributed: DistributedTier,
    bus: Arc<dyn InvalidationBus>,
    policies: PolicyRegistry,
    bus_timeout: Duration,
    apply_own_invalidations: bool,
    counters: CoordinatorCounters,
}

impl TieredCacheCoordinator {
    /// Starts a builder with a random instance id and default policies.
    pub fn builder(
        local: Arc<LocalTier>,
        store: Arc<dyn DistributedStore>,
        bus: Arc<dyn InvalidationBus>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            instance_id: uuid::Uuid::new_v4().to_string(),
            local,
            store,
            bus,
            policies: PolicyRegistry::default(),
            distributed_timeout: DEFAULT_DISTRIBUTED_TIMEOUT,
            bulk_timeout: DEFAULT_BULK_TIMEOUT,
            apply_own_invalidations: false,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn local(&self) -> &Arc<LocalTier> {
        &self.local
    }

    pub fn distributed(&self) -> &DistributedTier {
        &self.distributed
    }

    pub fn bus(&self) -> &Arc<dyn InvalidationBus> {
        &self.bus
    }

    pub fn policy_for(&self, namespace: &CacheNamespace) -> TierPolicy {
        self.policies.policy_for(namespace)
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    // == Lookup ==
    /// Local tier, then distributed tier with local backfill. Never invokes
    /// an operation.
    pub async fn lookup<T>(&self, key: &CacheKey, policy: &TierPolicy) -> Option<T>
    where
        T: DeserializeOwned,
    {
        if policy.use_local {
            if let Some(payload) = self.local.get(key) {
                match decode::<T>(key, Tier::Local, &payload) {
                    Some(value) => {
                        debug!(key = %key, "Cache hit (local)");
                        return Some(value);
                    }
                    None => {
                        self.local.evict(key);
                    }
                }
            }
        }

        if policy.use_distributed {
            if let Some(payload) = self.distributed.get(key).await {
                match decode::<T>(key, Tier::Distributed, &payload) {
                    Some(value) => {
                        debug!(key = %key, "Cache hit (distributed)");
                        if policy.use_local {
                            // Backfill uses the local policy TTL, not the
                            // distributed entry's remaining TTL.
                            self.local.put(key, payload, policy.local_ttl);
                        }
                        return Some(value);
                    }
                    None => {
                        self.distributed.evict(key).await;
                    }
                }
            }
        }

        None
    }

    /// [`lookup`](Self::lookup) with the namespace policy.
    pub async fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let policy = self.policy_for(key.namespace());
        self.lookup(key, &policy).await
    }

    // == Populate ==
    /// Writes `value` into the enabled tiers: distributed first, then local.
    /// The local write happens even when the distributed write failed.
    /// Empty values (`null`, `[]`) are never written. Returns whether
    /// anything was cached.
    pub async fn populate<T>(&self, key: &CacheKey, value: &T, policy: &TierPolicy) -> bool
    where
        T: Serialize,
    {
        if policy.is_disabled() {
            return false;
        }

        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Result not serializable, skipping cache write");
                return false;
            }
        };

        if is_empty_result(&json) {
            self.counters.record_skipped_empty();
            debug!(key = %key, "Empty result, not cached");
            return false;
        }

        let payload = json.to_string();

        if policy.use_distributed {
            self.distributed
                .put(key, payload.clone(), policy.distributed_ttl)
                .await;
        }
        if policy.use_local {
            self.local.put(key, payload, policy.local_ttl);
        }

        self.counters.record_populate();
        debug!(key = %key, "Cache populated");
        true
    }

    /// Explicit put with the namespace policy.
    pub async fn put<T>(&self, key: &CacheKey, value: &T) -> bool
    where
        T: Serialize,
    {
        let policy = self.policy_for(key.namespace());
        self.populate(key, value, &policy).await
    }

    // == Read-Through ==
    /// Returns the cached value for `key`, or runs `operation` on a total
    /// miss and caches its successful, non-empty result.
    ///
    /// There is no single-flight guard: concurrent misses may each run the
    /// operation.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        policy: &TierPolicy,
        operation: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if policy.is_disabled() {
            self.counters.record_load();
            return operation().await;
        }

        self.counters.record_lookup();
        if let Some(value) = self.lookup::<T>(key, policy).await {
            return Ok(value);
        }

        self.counters.record_miss();
        self.counters.record_load();
        let value = operation().await?;
        self.populate(key, &value, policy).await;
        Ok(value)
    }

    /// [`read_through`](Self::read_through) with the namespace policy.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, operation: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = self.policy_for(key.namespace());
        self.read_through(key, &policy, operation).await
    }

    // == Write-Through ==
    /// Runs `operation` unconditionally, then overwrites `key` in the
    /// enabled tiers with its result and tells peers to drop their local
    /// copy. Without the local tier, this instance's copy is dropped too.
    /// An empty result removes the key instead, since the old value is
    /// now stale.
    pub async fn write_through<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        policy: &TierPolicy,
        operation: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.counters.record_load();
        let value = operation().await?;

        if policy.is_disabled() {
            return Ok(value);
        }

        if !self.populate(key, &value, policy).await {
            self.evict_key(key).await;
            return Ok(value);
        }

        // A distributed-only write leaves any local copy here stale.
        if !policy.use_local {
            self.local.evict(key);
        }
        self.publish(InvalidationMessage::key(key, &self.instance_id))
            .await;
        Ok(value)
    }

    // == Evict ==
    /// Runs `operation` with an eviction of `target` before or after it.
    ///
    /// With [`EvictTiming::After`] the eviction only happens when the
    /// operation succeeded. With [`EvictTiming::Before`] it always happens.
    pub async fn evict<R, E, F, Fut>(
        &self,
        target: &EvictTarget,
        timing: EvictTiming,
        operation: F,
    ) -> Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        match timing {
            EvictTiming::Before => {
                self.evict_target(target).await;
                operation().await
            }
            EvictTiming::After => {
                let result = operation().await;
                if result.is_ok() {
                    self.evict_target(target).await;
                }
                result
            }
        }
    }

    pub async fn evict_target(&self, target: &EvictTarget) -> EvictionReport {
        match target {
            EvictTarget::Key(key) => self.evict_key(key).await,
            EvictTarget::Namespace(namespace) => self.evict_namespace(namespace).await,
        }
    }

    /// Removes one key from both tiers and publishes a key invalidation.
    pub async fn evict_key(&self, key: &CacheKey) -> EvictionReport {
        let local_removed = usize::from(self.local.evict(key));
        let distributed_removed = self.distributed.evict(key).await.map(u64::from);
        let published = self
            .publish(InvalidationMessage::key(key, &self.instance_id))
            .await;

        debug!(key = %key, "Cache key evicted");
        EvictionReport {
            local_removed,
            distributed_removed,
            published,
        }
    }

    /// Clears a namespace: local clear, distributed prefix delete, then an
    /// "all" invalidation so every peer clears its local tier too.
    pub async fn evict_namespace(&self, namespace: &CacheNamespace) -> EvictionReport {
        let local_removed = self.local.clear(namespace);
        let distributed_removed = self.distributed.evict_by_prefix(namespace).await;
        let published = self
            .publish(InvalidationMessage::all(namespace, &self.instance_id))
            .await;

        info!(
            namespace = %namespace,
            local_removed,
            distributed_removed = ?distributed_removed,
            "Cache namespace cleared"
        );
        EvictionReport {
            local_removed,
            distributed_removed,
            published,
        }
    }

    // == Invalidation ==
    /// Applies a bus message to the local tier. Returns whether it was
    /// applied; own messages are skipped unless configured otherwise.
    /// Re-applying a message is harmless.
    pub fn apply_invalidation(&self, message: &InvalidationMessage) -> bool {
        if message.is_from(&self.instance_id) && !self.apply_own_invalidations {
            return false;
        }

        match message.target_key() {
            Some(key) => {
                self.local.evict(&key);
            }
            None => {
                self.local.clear(&message.namespace);
            }
        }

        self.counters.record_applied();
        debug!(
            namespace = %message.namespace,
            origin = %message.origin,
            "Applied invalidation"
        );
        true
    }

    /// Hands a message to the bus without ever failing the caller.
    async fn publish(&self, message: InvalidationMessage) -> bool {
        let outcome = match tokio::time::timeout(self.bus_timeout, self.bus.publish(&message)).await
        {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.bus_timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(()) => {
                self.counters.record_published();
                true
            }
            Err(e) => {
                warn!(
                    namespace = %message.namespace,
                    backend = self.bus.backend_name(),
                    error = %e,
                    "Invalidation publish failed, peers stay stale until local TTL"
                );
                false
            }
        }
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local: self.local.stats(),
            distributed: self.distributed.stats(),
            coordinator: self.counters.snapshot(),
        }
    }
}

/// `null` and `[]` count as "no result".
fn is_empty_result(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Decodes a cached payload; a corrupt payload is logged and read as a miss.
fn decode<T: DeserializeOwned>(key: &CacheKey, tier: Tier, payload: &str) -> Option<T> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, tier = %tier, error = %e, "Undecodable cache entry, evicting");
            None
        }
    }
}
