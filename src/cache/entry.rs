//! Cache Entry Module
//!
//! Defines the stored form of a cached value with its tier and TTL.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

// == Tier ==
/// Storage layer an entry resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Local,
    Distributed,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Local => f.write_str("local"),
            Tier::Distributed => f.write_str("distributed"),
        }
    }
}

// == Cache Entry ==
/// A serialized value plus the metadata needed to expire it.
///
/// Expiry is measured on the monotonic clock, so wall-clock steps never
/// revive or prematurely expire an entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized business result (JSON)
    pub value: String,
    /// Tier this entry lives in
    pub tier: Tier,
    /// Insertion instant
    pub created_at: Instant,
    /// TTL the entry was written with
    pub ttl: Duration,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry that expires `ttl` from now.
    pub fn new(value: String, tier: Tier, ttl: Duration) -> Self {
        Self {
            value,
            tier,
            created_at: Instant::now(),
            ttl,
        }
    }

    // == Is Expired ==
    /// An entry is expired once its age reaches the TTL, so a zero TTL is
    /// expired on creation.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    /// Returns the remaining TTL, `Duration::ZERO` once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.created_at.elapsed())
    }
}
