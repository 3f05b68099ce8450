//! Cache Statistics Module
//!
//! Process-wide cache operation counters and derived rates. Counters are plain
//! atomics incremented on the hot path; snapshots compute hit/miss rates as
//! percentages, reporting 0 when no read operation has happened yet.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot of cache statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub total_operations: u64,
    /// Percentage of read operations served from cache, in [0, 100]
    pub hit_rate: f64,
    /// Percentage of read operations that missed, in [0, 100]
    pub miss_rate: f64,
    pub uptime_seconds: u64,
}

/// Counter set backing [`CacheStats`] snapshots
#[derive(Debug)]
pub struct CacheStatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
}

impl Default for CacheStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStatsTracker {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot with derived rates
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let (hit_rate, miss_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                hits as f64 / total as f64 * 100.0,
                misses as f64 / total as f64 * 100.0,
            )
        };

        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_operations: total,
            hit_rate,
            miss_rate,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker_has_zero_rates() {
        let tracker = CacheStatsTracker::new();
        let stats = tracker.snapshot();
        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.miss_rate, 0.0);
    }

    #[test]
    fn test_rates_sum_to_one_hundred() {
        let tracker = CacheStatsTracker::new();
        for _ in 0..3 {
            tracker.record_hit();
        }
        tracker.record_miss();

        let stats = tracker.snapshot();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_operations, 4);
        assert!((stats.hit_rate - 75.0).abs() < f64::EPSILON);
        assert!((stats.hit_rate + stats.miss_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let tracker = CacheStatsTracker::new();
        tracker.record_hit();
        tracker.record_set();
        tracker.record_error();
        tracker.reset();

        let stats = tracker.snapshot();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }
}
