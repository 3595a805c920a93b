//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment
//! variables. Per-namespace tier policies and event routes are read once at
//! startup and frozen; nothing here is hot-reloadable.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheNamespace, PolicyOverrides, PolicyRegistry, TierPolicy};
use crate::error::Result;

/// Per-namespace policy settings as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    pub name: String,
    pub overrides: PolicyOverrides,
}

/// Aggregate type -> namespaces, from `EVENT_NAMESPACES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRoute {
    pub aggregate_type: String,
    pub namespaces: Vec<String>,
}

/// Cache service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admin HTTP server port
    pub server_port: u16,
    /// Origin id stamped on published invalidations
    pub instance_id: String,
    /// Distributed store and bus; `None` runs both in-process
    pub redis_url: Option<String>,
    /// Prefix prepended to every Redis key and channel
    pub redis_key_prefix: String,
    /// Timeout for each distributed call and bus publish, in milliseconds
    pub distributed_timeout_ms: u64,
    /// Budget for a whole namespace delete in the distributed tier, in milliseconds
    pub distributed_bulk_timeout_ms: u64,
    /// Maximum number of entries the local tier can hold
    pub local_max_entries: usize,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Local TTL in seconds for namespaces without their own
    pub default_local_ttl: u64,
    /// Distributed TTL in seconds for namespaces without their own
    pub default_distributed_ttl: u64,
    pub namespaces: Vec<NamespaceConfig>,
    pub apply_own_invalidations: bool,
    pub event_routes: Vec<EventRoute>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `INSTANCE_ID` - Instance id (default: random UUID)
    /// - `REDIS_URL` - Redis URL (default: unset, in-process tiers)
    /// - `REDIS_KEY_PREFIX` - Redis key/channel prefix (default: empty)
    /// - `DISTRIBUTED_TIMEOUT_MS` - Distributed call timeout (default: 250)
    /// - `DISTRIBUTED_BULK_TIMEOUT_MS` - Namespace delete budget (default: 30000)
    /// - `LOCAL_MAX_ENTRIES` - Local tier capacity (default: 10000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `DEFAULT_LOCAL_TTL` / `DEFAULT_DISTRIBUTED_TTL` - Seconds (default: 300 / 1800)
    /// - `CACHE_NAMESPACES` - Comma-separated namespaces with explicit policies
    /// - `<NS>_USE_LOCAL`, `<NS>_USE_DISTRIBUTED`, `<NS>_LOCAL_TTL`, `<NS>_DISTRIBUTED_TTL`
    /// - `APPLY_OWN_INVALIDATIONS` - Apply own bus messages (default: false)
    /// - `EVENT_NAMESPACES` - `aggregate=ns1+ns2,...`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from any variable source. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespaces = lookup("CACHE_NAMESPACES")
            .map(|list| split_list(&list))
            .unwrap_or_default()
            .into_iter()
            .map(|name| {
                let prefix = env_prefix(&name);
                let overrides = PolicyOverrides {
                    use_local: lookup(&format!("{prefix}_USE_LOCAL")).and_then(|v| parse_bool(&v)),
                    use_distributed: lookup(&format!("{prefix}_USE_DISTRIBUTED"))
                        .and_then(|v| parse_bool(&v)),
                    local_ttl: parse_var::<u64, _>(&lookup, &format!("{prefix}_LOCAL_TTL"))
                        .map(Duration::from_secs),
                    distributed_ttl: parse_var::<u64, _>(
                        &lookup,
                        &format!("{prefix}_DISTRIBUTED_TTL"),
                    )
                    .map(Duration::from_secs),
                };
                NamespaceConfig { name, overrides }
            })
            .collect();

        Self {
            server_port: parse_var(&lookup, "SERVER_PORT").unwrap_or(defaults.server_port),
            instance_id: lookup("INSTANCE_ID")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.instance_id),
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            redis_key_prefix: lookup("REDIS_KEY_PREFIX").unwrap_or_default(),
            distributed_timeout_ms: parse_var(&lookup, "DISTRIBUTED_TIMEOUT_MS")
                .unwrap_or(defaults.distributed_timeout_ms),
            distributed_bulk_timeout_ms: parse_var(&lookup, "DISTRIBUTED_BULK_TIMEOUT_MS")
                .unwrap_or(defaults.distributed_bulk_timeout_ms),
            local_max_entries: parse_var(&lookup, "LOCAL_MAX_ENTRIES")
                .unwrap_or(defaults.local_max_entries),
            cleanup_interval: parse_var(&lookup, "CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
            default_local_ttl: parse_var(&lookup, "DEFAULT_LOCAL_TTL")
                .unwrap_or(defaults.default_local_ttl),
            default_distributed_ttl: parse_var(&lookup, "DEFAULT_DISTRIBUTED_TTL")
                .unwrap_or(defaults.default_distributed_ttl),
            namespaces,
            apply_own_invalidations: lookup("APPLY_OWN_INVALIDATIONS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.apply_own_invalidations),
            event_routes: lookup("EVENT_NAMESPACES")
                .map(|v| parse_event_routes(&v))
                .unwrap_or_default(),
        }
    }

    pub fn distributed_timeout(&self) -> Duration {
        Duration::from_millis(self.distributed_timeout_ms)
    }

    pub fn distributed_bulk_timeout(&self) -> Duration {
        Duration::from_millis(self.distributed_bulk_timeout_ms)
    }

    /// Policy for namespaces without their own settings.
    pub fn default_policy(&self) -> TierPolicy {
        TierPolicy::new(
            Duration::from_secs(self.default_local_ttl),
            Duration::from_secs(self.default_distributed_ttl),
        )
    }

    /// Freezes the namespace policies. Fails on an invalid namespace name.
    pub fn policy_registry(&self) -> Result<PolicyRegistry> {
        let default = self.default_policy();
        self.namespaces
            .iter()
            .try_fold(PolicyRegistry::new(default), |registry, ns| {
                let namespace = CacheNamespace::new(ns.name.as_str())?;
                Ok(registry.with_policy(namespace, default.with_overrides(&ns.overrides)))
            })
    }

    /// Validated event routes. Fails on an invalid namespace name.
    pub fn resolved_event_routes(&self) -> Result<Vec<(String, Vec<CacheNamespace>)>> {
        self.event_routes
            .iter()
            .map(|route| {
                let namespaces = route
                    .namespaces
                    .iter()
                    .map(|name| CacheNamespace::new(name.as_str()))
                    .collect::<Result<Vec<_>>>()?;
                Ok((route.aggregate_type.clone(), namespaces))
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            instance_id: uuid::Uuid::new_v4().to_string(),
            redis_url: None,
            redis_key_prefix: String::new(),
            distributed_timeout_ms: 250,
            distributed_bulk_timeout_ms: 30_000,
            local_max_entries: 10_000,
            cleanup_interval: 1,
            default_local_ttl: 300,
            default_distributed_ttl: 1800,
            namespaces: Vec::new(),
            apply_own_invalidations: false,
            event_routes: Vec::new(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}

/// `book-search.v2` -> `BOOK_SEARCH_V2`
fn env_prefix(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `book=books+book-search,author=authors`; malformed entries are skipped.
fn parse_event_routes(value: &str) -> Vec<EventRoute> {
    split_list(value)
        .into_iter()
        .filter_map(|entry| {
            let (aggregate_type, namespaces) = entry.split_once('=')?;
            let namespaces: Vec<String> = namespaces
                .split('+')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            let aggregate_type = aggregate_type.trim();
            if aggregate_type.is_empty() || namespaces.is_empty() {
                return None;
            }
            Some(EventRoute {
                aggregate_type: aggregate_type.to_string(),
                namespaces,
            })
        })
        .collect()
}
