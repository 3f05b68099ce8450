//! Connection Pool Module
//!
//! Pool sizing recommendations derived from host resources, and a stateless
//! health evaluation for pools owned elsewhere. Sizing is a pure function of
//! the CPU count so it stays deterministic and testable; the monitor only
//! reads a snapshot and logs, it keeps no state between calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Utilization percentage above which a pool is considered under pressure
const HIGH_UTILIZATION_PERCENT: f32 = 80.0;

/// Recommended pool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSizing {
    pub min_connections: u32,
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

/// Point-in-time pool usage snapshot, as reported by the owning pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub size: u32,
    pub available: u32,
    pub using: u32,
    pub waiting: u32,
}

/// Result of one pool health evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealthReport {
    pub utilization_percent: f32,
    pub availability_percent: f32,
    pub high_utilization: bool,
    pub has_waiters: bool,
}

/// Compute recommended pool parameters for this host
pub fn calculate_optimal_pool_size() -> PoolSizing {
    let cpu_count = std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1);
    pool_size_for_cpu_count(cpu_count)
}

/// Pure sizing function: connections scale with cores, bounded on both ends
/// so a single-core host still gets a workable pool and a large host cannot
/// exhaust the backend's connection budget.
pub fn pool_size_for_cpu_count(cpu_count: u32) -> PoolSizing {
    let base = (cpu_count.saturating_mul(2)).clamp(2, 20);
    let max_connections = (cpu_count.saturating_mul(4)).clamp(base, 50);
    let min_connections = (base / 2).max(2);

    PoolSizing {
        min_connections,
        max_connections,
        idle_timeout: Duration::from_secs(30),
        acquire_timeout: Duration::from_secs(60),
    }
}

/// Evaluate a pool snapshot, logging its state and warning on pressure.
///
/// Any waiting acquirer is itself worth a warning: a correctly sized pool
/// should rarely saturate, so a non-empty wait queue is an early signal.
pub fn monitor_pool_health(pool_name: &str, stats: &PoolStats) -> PoolHealthReport {
    let (utilization_percent, availability_percent) = if stats.size == 0 {
        (0.0, 0.0)
    } else {
        (
            stats.using as f32 / stats.size as f32 * 100.0,
            stats.available as f32 / stats.size as f32 * 100.0,
        )
    };

    info!(
        "Connection pool '{}': size={}, using={} ({:.1}%), available={} ({:.1}%), waiting={}",
        pool_name,
        stats.size,
        stats.using,
        utilization_percent,
        stats.available,
        availability_percent,
        stats.waiting
    );

    let high_utilization = utilization_percent > HIGH_UTILIZATION_PERCENT;
    if high_utilization {
        warn!(
            "Connection pool '{}' utilization is high: {:.1}% (threshold {:.0}%)",
            pool_name, utilization_percent, HIGH_UTILIZATION_PERCENT
        );
    }

    let has_waiters = stats.waiting > 0;
    if has_waiters {
        warn!(
            "Connection pool '{}' has {} requests waiting for a connection",
            pool_name, stats.waiting
        );
    }

    PoolHealthReport {
        utilization_percent,
        availability_percent,
        high_utilization,
        has_waiters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_core_sizing() {
        let sizing = pool_size_for_cpu_count(1);
        assert_eq!(sizing.min_connections, 2);
        assert_eq!(sizing.max_connections, 4);
    }

    #[test]
    fn test_typical_host_sizing() {
        let sizing = pool_size_for_cpu_count(8);
        // base = 16, max = 32, min = 8
        assert_eq!(sizing.min_connections, 8);
        assert_eq!(sizing.max_connections, 32);
        assert_eq!(sizing.idle_timeout, Duration::from_secs(30));
        assert_eq!(sizing.acquire_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_large_host_is_capped() {
        let sizing = pool_size_for_cpu_count(128);
        assert_eq!(sizing.max_connections, 50);
        assert!(sizing.min_connections >= 2);
        assert!(sizing.max_connections >= sizing.min_connections);
    }

    #[test]
    fn test_monitor_flags_pressure() {
        let report = monitor_pool_health(
            "postgres",
            &PoolStats {
                size: 10,
                available: 1,
                using: 9,
                waiting: 3,
            },
        );
        assert!(report.high_utilization);
        assert!(report.has_waiters);
        assert!((report.utilization_percent - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_monitor_handles_empty_pool() {
        let report = monitor_pool_health(
            "empty",
            &PoolStats {
                size: 0,
                available: 0,
                using: 0,
                waiting: 0,
            },
        );
        assert_eq!(report.utilization_percent, 0.0);
        assert!(!report.high_utilization);
        assert!(!report.has_waiters);
    }
}
