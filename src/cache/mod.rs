//! Cache Module
//!
//! Two-tier caching: a process-local tier with TTL and LRU eviction, a
//! shared distributed tier, and an invalidation bus that keeps every
//! instance's local tier in step with writes made elsewhere.

pub mod coordinator;
pub mod distributed;
pub mod entry;
pub mod events;
pub mod interception;
pub mod invalidation;
pub mod key;
pub mod local;
pub mod lru;
pub mod policy;
pub mod redis_store;
pub mod stats;


// Re-export public types
pub use coordinator::{CoordinatorBuilder, EvictTarget, EvictionReport, TieredCacheCoordinator};
pub use distributed::{
    DistributedStore, DistributedTier, InMemoryStore, DEFAULT_BULK_TIMEOUT,
    DEFAULT_DISTRIBUTED_TIMEOUT,
};
pub use entry::{CacheEntry, Tier};
pub use events::{AggregateChanged, DomainEventHandler};
pub use interception::{CacheMode, CacheOptions, CachedOperation, EvictScope, EvictTiming};
pub use invalidation::{
    BroadcastBus, InvalidationBus, InvalidationMessage, InvalidationScope, InvalidationStream,
    RedisBus,
};
pub use key::{key_builder, CacheKey, CacheNamespace, KeyArgs, KeyBuilder, KeyCodec, KeyExpressionError};
pub use local::LocalTier;
pub use policy::{PolicyOverrides, PolicyRegistry, TierPolicy, DEFAULT_DISTRIBUTED_TTL, DEFAULT_LOCAL_TTL};
pub use redis_store::RedisStore;
pub use stats::{CacheStats, CoordinatorStats, TierStats};
