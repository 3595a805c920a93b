//! Tier Policy Module
//!
//! Per-namespace tier enablement and TTLs, fixed at startup.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::cache::key::CacheNamespace;

/// Default local TTL: 5 minutes
pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(300);

/// Default distributed TTL: 30 minutes
pub const DEFAULT_DISTRIBUTED_TTL: Duration = Duration::from_secs(1800);

// == Tier Policy ==
/// Which tiers a namespace uses and for how long entries live in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierPolicy {
    pub use_local: bool,
    pub use_distributed: bool,
    pub local_ttl: Duration,
    pub distributed_ttl: Duration,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            use_local: true,
            use_distributed: true,
            local_ttl: DEFAULT_LOCAL_TTL,
            distributed_ttl: DEFAULT_DISTRIBUTED_TTL,
        }
    }
}

impl TierPolicy {
    pub fn new(local_ttl: Duration, distributed_ttl: Duration) -> Self {
        Self {
            local_ttl,
            distributed_ttl,
            ..Self::default()
        }
    }

    pub fn local_only(local_ttl: Duration) -> Self {
        Self {
            use_local: true,
            use_distributed: false,
            local_ttl,
            ..Self::default()
        }
    }

    pub fn distributed_only(distributed_ttl: Duration) -> Self {
        Self {
            use_local: false,
            use_distributed: true,
            distributed_ttl,
            ..Self::default()
        }
    }

    /// Applies per-operation overrides on top of this policy.
    pub fn with_overrides(&self, overrides: &PolicyOverrides) -> Self {
        Self {
            use_local: overrides.use_local.unwrap_or(self.use_local),
            use_distributed: overrides.use_distributed.unwrap_or(self.use_distributed),
            local_ttl: overrides.local_ttl.unwrap_or(self.local_ttl),
            distributed_ttl: overrides.distributed_ttl.unwrap_or(self.distributed_ttl),
        }
    }

    /// True when neither tier is enabled: every call goes to the operation.
    pub fn is_disabled(&self) -> bool {
        !self.use_local && !self.use_distributed
    }
}

// == Policy Overrides ==
/// Optional per-operation replacements for namespace policy fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    pub use_local: Option<bool>,
    pub use_distributed: Option<bool>,
    pub local_ttl: Option<Duration>,
    pub distributed_ttl: Option<Duration>,
}

// == Policy Registry ==
/// Namespace -> policy lookup with a fallback default.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    default: TierPolicy,
    policies: HashMap<CacheNamespace, TierPolicy>,
}

impl PolicyRegistry {
    pub fn new(default: TierPolicy) -> Self {
        Self {
            default,
            policies: HashMap::new(),
        }
    }

    /// Registers a namespace policy. Only used while building the registry.
    pub fn with_policy(mut self, namespace: CacheNamespace, policy: TierPolicy) -> Self {
        self.policies.insert(namespace, policy);
        self
    }

    pub fn policy_for(&self, namespace: &CacheNamespace) -> TierPolicy {
        self.policies
            .get(namespace)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_policy(&self) -> TierPolicy {
        self.default
    }

    /// Namespaces with an explicit policy.
    pub fn namespaces(&self) -> impl Iterator<Item = &CacheNamespace> {
        self.policies.keys()
    }
}
