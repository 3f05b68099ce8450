//! Property-based tests for retry with exponential backoff
//!
//! *For any* retry configuration and attempt number, the computed delay SHALL
//! follow exponential backoff from the initial delay (100ms, 200ms, 400ms, ...
//! with the default multiplier) and SHALL never exceed the configured maximum
//! delay.

use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
use std::time::Duration;
use storefront_cache::retry::{calculate_retry_delay, RetryConfig};

// ============================================================================
// Test Data Structures
// ============================================================================

/// An attempt number within a realistic retry budget
#[derive(Debug, Clone, Copy)]
struct AttemptNumber(u32);

impl Arbitrary for AttemptNumber {
    fn arbitrary(g: &mut Gen) -> Self {
        AttemptNumber(u32::arbitrary(g) % 10)
    }
}

/// An initial delay between 1ms and 1s
#[derive(Debug, Clone, Copy)]
struct InitialDelayMs(u64);

impl Arbitrary for InitialDelayMs {
    fn arbitrary(g: &mut Gen) -> Self {
        InitialDelayMs((u64::arbitrary(g) % 1000) + 1)
    }
}

fn config_with_initial(initial_ms: u64) -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(initial_ms),
        ..RetryConfig::default()
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Delay doubles on every attempt until the cap is reached
fn prop_delay_doubles(initial: InitialDelayMs, attempt: AttemptNumber) -> TestResult {
    let config = config_with_initial(initial.0);

    let current = calculate_retry_delay(&config, attempt.0);
    let next = calculate_retry_delay(&config, attempt.0 + 1);

    // Once either delay hits the cap the doubling relation no longer applies
    if next >= config.max_delay || current >= config.max_delay {
        return TestResult::discard();
    }

    TestResult::from_bool(next == current * 2)
}

/// The first delay equals the configured initial delay
fn prop_first_delay_is_initial(initial: InitialDelayMs) -> bool {
    let config = config_with_initial(initial.0);
    calculate_retry_delay(&config, 0) == Duration::from_millis(initial.0)
}

/// No delay ever exceeds the configured maximum
fn prop_delay_never_exceeds_max(initial: InitialDelayMs, attempt: AttemptNumber) -> bool {
    let config = config_with_initial(initial.0);
    calculate_retry_delay(&config, attempt.0) <= config.max_delay
}

/// Delays are non-decreasing in the attempt number
fn prop_delay_is_monotonic(initial: InitialDelayMs, attempt: AttemptNumber) -> bool {
    let config = config_with_initial(initial.0);
    calculate_retry_delay(&config, attempt.0 + 1) >= calculate_retry_delay(&config, attempt.0)
}

// ============================================================================
// Test Runners
// ============================================================================

#[test]
fn test_delay_doubles_until_capped() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_delay_doubles as fn(InitialDelayMs, AttemptNumber) -> TestResult);
}

#[test]
fn test_first_delay_is_initial() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_first_delay_is_initial as fn(InitialDelayMs) -> bool);
}

#[test]
fn test_delay_never_exceeds_max() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_delay_never_exceeds_max as fn(InitialDelayMs, AttemptNumber) -> bool);
}

#[test]
fn test_delay_is_monotonic() {
    QuickCheck::new()
        .tests(500)
        .quickcheck(prop_delay_is_monotonic as fn(InitialDelayMs, AttemptNumber) -> bool);
}

#[test]
fn test_default_schedule_first_attempts() {
    let config = RetryConfig::default();
    assert_eq!(calculate_retry_delay(&config, 0), Duration::from_millis(100));
    assert_eq!(calculate_retry_delay(&config, 1), Duration::from_millis(200));
    assert_eq!(calculate_retry_delay(&config, 2), Duration::from_millis(400));
}

#[test]
fn test_large_attempt_saturates_at_max_delay() {
    let config = RetryConfig::default();
    assert_eq!(calculate_retry_delay(&config, 30), config.max_delay);
}
