//! Cache Statistics Module
//!
//! Per-tier and coordinator counters. The local tier updates a plain
//! [`TierStats`] under its own lock; the distributed tier and the
//! coordinator are shared across tasks and count with atomics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Tier Stats ==
/// Counters for a single tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStats {
    /// Lookups answered by this tier
    pub hits: u64,
    /// Lookups this tier could not answer
    pub misses: u64,
    /// Entries removed by eviction (capacity or explicit)
    pub evictions: u64,
    /// Calls that failed or timed out
    pub failures: u64,
    /// Current number of entries, when the tier can tell
    pub entries: usize,
}

impl TierStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    pub fn set_entries(&mut self, count: usize) {
        self.entries = count;
    }
}

// == Atomic Tier Stats ==
/// Lock-free tier counters for tiers shared between tasks.
#[derive(Debug, Default)]
pub struct AtomicTierStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    failures: AtomicU64,
}

impl AtomicTierStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entries: 0,
        }
    }
}

// == Coordinator Stats ==
/// Snapshot of the read/write-through protocol counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorStats {
    /// Read-through lookups
    pub lookups: u64,
    /// Lookups that missed every enabled tier
    pub misses: u64,
    /// Invocations of wrapped operations
    pub loads: u64,
    /// Results written into the tiers
    pub populates: u64,
    /// Results not cached because they were empty
    pub skipped_empty: u64,
    /// Invalidation messages sent on the bus
    pub invalidations_published: u64,
    /// Invalidation messages applied to the local tier
    pub invalidations_applied: u64,
}

impl CoordinatorStats {
    /// Share of lookups served from any tier.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.lookups.saturating_sub(self.misses), self.lookups)
    }
}

/// Atomic backing store for [`CoordinatorStats`].
#[derive(Debug, Default)]
pub struct CoordinatorCounters {
    lookups: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    populates: AtomicU64,
    skipped_empty: AtomicU64,
    invalidations_published: AtomicU64,
    invalidations_applied: AtomicU64,
}

impl CoordinatorCounters {
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_populate(&self) {
        self.populates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_empty(&self) {
        self.skipped_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.invalidations_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.invalidations_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            populates: self.populates.load(Ordering::Relaxed),
            skipped_empty: self.skipped_empty.load(Ordering::Relaxed),
            invalidations_published: self.invalidations_published.load(Ordering::Relaxed),
            invalidations_applied: self.invalidations_applied.load(Ordering::Relaxed),
        }
    }
}

// == Cache Stats ==
/// Full statistics snapshot returned by the coordinator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub local: TierStats,
    pub distributed: TierStats,
    pub coordinator: CoordinatorStats,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        self.coordinator.hit_rate()
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_hit_rate() {
        let mut stats = TierStats::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_atomic_tier_snapshot() {
        let stats = AtomicTierStats::default();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_failure();
        stats.record_evictions(3);

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.evictions, 3);
    }

    #[test]
    fn test_coordinator_hit_rate() {
        let counters = CoordinatorCounters::default();
        for _ in 0..4 {
            counters.record_lookup();
        }
        counters.record_miss();

        let snap = counters.snapshot();
        assert_eq!(snap.lookups, 4);
        assert!((snap.hit_rate() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_coordinator_hit_rate_no_lookups() {
        assert_eq!(CoordinatorStats::default().hit_rate(), 0.0);
    }
}
