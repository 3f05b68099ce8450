//! Retry Module
//!
//! Exponential backoff retry for transient backend faults. The delay schedule
//! is a pure function of the attempt number so it can be tested without timers.

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Calculate the backoff delay before retry number `attempt` (0-based).
///
/// Delays grow as `initial_delay * multiplier^attempt`, capped at `max_delay`.
pub fn calculate_retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay_ms =
        config.initial_delay.as_millis() as f64 * config.backoff_multiplier.powi(attempt as i32);

    let delay = Duration::from_millis(delay_ms as u64);

    if delay > config.max_delay {
        config.max_delay
    } else {
        delay
    }
}

/// Run a fallible async operation with exponential backoff.
///
/// The final attempt's error is returned when every attempt fails.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        "{} succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        config.max_attempts
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= config.max_attempts {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, e
                    );
                    return Err(e);
                }

                let delay = calculate_retry_delay(config, attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation_name, attempt, config.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_schedule() {
        let config = RetryConfig::default();
        assert_eq!(calculate_retry_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(calculate_retry_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(calculate_retry_delay(&config, 2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(250),
            ..RetryConfig::default()
        };
        assert_eq!(calculate_retry_delay(&config, 5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = calls.clone();

        let result = retry_with_backoff(&config, "flaky op", move || {
            let calls = calls_in_op.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceError::ConnectionError("transient".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_op = calls.clone();

        let result: Result<()> = retry_with_backoff(&config, "doomed op", move || {
            let calls = calls_in_op.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::ConnectionError("down".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
