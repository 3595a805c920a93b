//! Tiered Cache - local + distributed read-through caching
//!
//! Keeps a process-local tier and a shared distributed tier consistent
//! through write-through, eviction, and bus-driven invalidation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod runtime;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheOptions, CachedOperation, TieredCacheCoordinator};
pub use config::Config;
pub use error::{CacheError, Result};
pub use runtime::CacheRuntime;
pub use tasks::{spawn_cleanup_task, spawn_event_consumer, spawn_invalidation_listener};
