//! Property-based tests for connection pool sizing invariants
//!
//! *For any* reported CPU count, the sizing recommendation SHALL satisfy
//! `min >= 2`, `max >= min`, and `max <= 50`, with fixed idle and acquire
//! timeouts. This holds for degenerate hosts (1 core) and large hosts
//! (128+ cores) alike.

use quickcheck::{Arbitrary, Gen, QuickCheck};
use std::time::Duration;
use storefront_cache::connection_pool::pool_size_for_cpu_count;

// ============================================================================
// Test Data Structures
// ============================================================================

/// A plausible CPU count, biased to include the interesting extremes
#[derive(Debug, Clone, Copy)]
struct CpuCount(u32);

impl Arbitrary for CpuCount {
    fn arbitrary(g: &mut Gen) -> Self {
        // Mix boundary values with arbitrary counts up to 1024
        let candidates = [1u32, 2, 3, 4, 8, 16, 32, 64, 128, 256, 1024];
        if bool::arbitrary(g) {
            CpuCount(*g.choose(&candidates).unwrap())
        } else {
            CpuCount((u32::arbitrary(g) % 1024) + 1)
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

fn prop_min_at_least_two(cpu: CpuCount) -> bool {
    pool_size_for_cpu_count(cpu.0).min_connections >= 2
}

fn prop_max_at_least_min(cpu: CpuCount) -> bool {
    let sizing = pool_size_for_cpu_count(cpu.0);
    sizing.max_connections >= sizing.min_connections
}

fn prop_max_bounded_above(cpu: CpuCount) -> bool {
    pool_size_for_cpu_count(cpu.0).max_connections <= 50
}

fn prop_timeouts_are_fixed(cpu: CpuCount) -> bool {
    let sizing = pool_size_for_cpu_count(cpu.0);
    sizing.idle_timeout == Duration::from_secs(30)
        && sizing.acquire_timeout == Duration::from_secs(60)
}

fn prop_sizing_is_deterministic(cpu: CpuCount) -> bool {
    pool_size_for_cpu_count(cpu.0) == pool_size_for_cpu_count(cpu.0)
}

/// More cores never shrink the recommendation
fn prop_monotonic_in_cpu_count(cpu: CpuCount) -> bool {
    let smaller = pool_size_for_cpu_count(cpu.0);
    let larger = pool_size_for_cpu_count(cpu.0 + 1);
    larger.min_connections >= smaller.min_connections
        && larger.max_connections >= smaller.max_connections
}

// ============================================================================
// Test Runners
// ============================================================================

#[test]
fn test_min_at_least_two() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_min_at_least_two as fn(CpuCount) -> bool);
}

#[test]
fn test_max_at_least_min() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_max_at_least_min as fn(CpuCount) -> bool);
}

#[test]
fn test_max_bounded_above() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_max_bounded_above as fn(CpuCount) -> bool);
}

#[test]
fn test_timeouts_are_fixed() {
    QuickCheck::new()
        .tests(100)
        .quickcheck(prop_timeouts_are_fixed as fn(CpuCount) -> bool);
}

#[test]
fn test_sizing_is_deterministic() {
    QuickCheck::new()
        .tests(100)
        .quickcheck(prop_sizing_is_deterministic as fn(CpuCount) -> bool);
}

#[test]
fn test_monotonic_in_cpu_count() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_monotonic_in_cpu_count as fn(CpuCount) -> bool);
}

#[test]
fn test_boundary_cpu_counts() {
    for cpu in [1u32, 2, 128] {
        let sizing = pool_size_for_cpu_count(cpu);
        assert!(sizing.min_connections >= 2, "cpu={}", cpu);
        assert!(sizing.max_connections >= sizing.min_connections, "cpu={}", cpu);
        assert!(sizing.max_connections <= 50, "cpu={}", cpu);
    }
}
