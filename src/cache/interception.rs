//! Operation Interception Module
//!
//! Declarative caching for async operations. A [`CachedOperation`] pairs an
//! operation with [`CacheOptions`] (namespace, operation id, key builder,
//! mode) and routes every call through the coordinator:
//!
//! ```text
//! call(args) ─► KeyCodec::derive ─► policy + overrides ─► mode
//!                                                          ├─ ReadThrough  ─► read_through
//!                                                          ├─ WriteThrough ─► write_through
//!                                                          └─ Evict        ─► evict (before/after)
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::coordinator::{EvictTarget, TieredCacheCoordinator};
use crate::cache::key::{CacheKey, CacheNamespace, KeyArgs, KeyBuilder, KeyCodec};
use crate::cache::policy::{PolicyOverrides, TierPolicy};

// == Modes ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve from cache, run the operation only on a total miss
    #[default]
    ReadThrough,
    /// Always run the operation, then overwrite the cached value
    WriteThrough,
    /// Run the operation and drop cached state
    Evict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictScope {
    /// Only the key derived from the call arguments
    #[default]
    SingleKey,
    /// Every entry of the namespace
    AllEntries,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictTiming {
    Before,
    /// Only evicts when the operation succeeded
    #[default]
    After,
}

// == Cache Options ==
/// Per-operation caching declaration.
pub struct CacheOptions<A> {
    pub namespace: CacheNamespace,
    pub operation_id: String,
    pub key: Option<KeyBuilder<A>>,
    pub overrides: PolicyOverrides,
    pub mode: CacheMode,
    pub evict_scope: EvictScope,
    pub evict_timing: EvictTiming,
}

impl<A> CacheOptions<A> {
    /// Read-through options with the default key for `operation_id`.
    pub fn new(namespace: CacheNamespace, operation_id: impl Into<String>) -> Self {
        Self {
            namespace,
            operation_id: operation_id.into(),
            key: None,
            overrides: PolicyOverrides::default(),
            mode: CacheMode::default(),
            evict_scope: EvictScope::default(),
            evict_timing: EvictTiming::default(),
        }
    }

    pub fn key(mut self, builder: KeyBuilder<A>) -> Self {
        self.key = Some(builder);
        self
    }

    pub fn mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn write_through(self) -> Self {
        self.mode(CacheMode::WriteThrough)
    }

    pub fn evict(mut self, scope: EvictScope, timing: EvictTiming) -> Self {
        self.mode = CacheMode::Evict;
        self.evict_scope = scope;
        self.evict_timing = timing;
        self
    }

    pub fn use_local(mut self, enabled: bool) -> Self {
        self.overrides.use_local = Some(enabled);
        self
    }

    pub fn use_distributed(mut self, enabled: bool) -> Self {
        self.overrides.use_distributed = Some(enabled);
        self
    }

    pub fn local_ttl(mut self, ttl: Duration) -> Self {
        self.overrides.local_ttl = Some(ttl);
        self
    }

    pub fn distributed_ttl(mut self, ttl: Duration) -> Self {
        self.overrides.distributed_ttl = Some(ttl);
        self
    }
}

impl<A> Clone for CacheOptions<A> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            operation_id: self.operation_id.clone(),
            key: self.key.clone(),
            overrides: self.overrides,
            mode: self.mode,
            evict_scope: self.evict_scope,
            evict_timing: self.evict_timing,
        }
    }
}

impl<A> fmt::Debug for CacheOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("namespace", &self.namespace)
            .field("operation_id", &self.operation_id)
            .field("custom_key", &self.key.is_some())
            .field("overrides", &self.overrides)
            .field("mode", &self.mode)
            .field("evict_scope", &self.evict_scope)
            .field("evict_timing", &self.evict_timing)
            .finish()
    }
}

// == Cached Operation ==
/// An async operation wrapped with caching behavior.
///
/// The wrapper is transparent: it returns exactly what the operation
/// returns, errors included.
pub struct CachedOperation<A, F> {
    coordinator: Arc<TieredCacheCoordinator>,
    options: CacheOptions<A>,
    operation: F,
}

impl<A, F> CachedOperation<A, F>
where
    A: KeyArgs,
{
    pub fn new(coordinator: Arc<TieredCacheCoordinator>, options: CacheOptions<A>, operation: F) -> Self {
        Self {
            coordinator,
            options,
            operation,
        }
    }

    pub fn options(&self) -> &CacheOptions<A> {
        &self.options
    }

    /// Key this call would read or write.
    pub fn key_for(&self, args: &A) -> CacheKey {
        KeyCodec::derive(
            &self.options.namespace,
            &self.options.operation_id,
            args,
            self.options.key.as_ref(),
        )
    }

    /// Namespace policy with this operation's overrides applied.
    pub fn effective_policy(&self) -> TierPolicy {
        self.coordinator
            .policy_for(&self.options.namespace)
            .with_overrides(&self.options.overrides)
    }

    /// Runs the operation in the configured mode.
    ///
    /// The result must round-trip through JSON because the caching modes
    /// store it. Evict-only operations with other result types go through
    /// [`call_evicting`](Self::call_evicting).
    pub async fn call<R, E, Fut>(&self, args: A) -> Result<R, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: Serialize + DeserializeOwned,
    {
        let key = self.key_for(&args);
        let policy = self.effective_policy();

        match self.options.mode {
            CacheMode::ReadThrough => {
                self.coordinator
                    .read_through(&key, &policy, || (self.operation)(args))
                    .await
            }
            CacheMode::WriteThrough => {
                self.coordinator
                    .write_through(&key, &policy, || (self.operation)(args))
                    .await
            }
            CacheMode::Evict => self.call_evicting(args).await,
        }
    }

    /// Runs the operation with the configured eviction, whatever the mode.
    /// The result is never cached, so it carries no serde bounds.
    pub async fn call_evicting<R, E, Fut>(&self, args: A) -> Result<R, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let target = match self.options.evict_scope {
            EvictScope::SingleKey => EvictTarget::Key(self.key_for(&args)),
            EvictScope::AllEntries => EvictTarget::Namespace(self.options.namespace.clone()),
        };
        self.coordinator
            .evict(&target, self.options.evict_timing, || (self.operation)(args))
            .await
    }
}
