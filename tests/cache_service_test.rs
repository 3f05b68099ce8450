use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use storefront_cache::backend::KeyValueBackend;
use storefront_cache::cache::{CacheService, MsetEntry, SetOptions};
use storefront_cache::config::CacheSettings;
use storefront_cache::health::HealthStatus;
use storefront_cache::memory_backend::MemoryBackend;
use storefront_cache::{Result, ServiceError};

/// Backend double whose every command fails and whose ping hangs, standing in
/// for an unreachable store
struct FailingBackend;

fn backend_down<T>() -> Result<T> {
    Err(ServiceError::ConnectionError(
        "connection refused".to_string(),
    ))
}

#[async_trait]
impl KeyValueBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        backend_down()
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
        backend_down()
    }

    async fn set_with_ttl(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        backend_down()
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64> {
        backend_down()
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        backend_down()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        backend_down()
    }

    async fn ttl(&self, _key: &str) -> Result<i64> {
        backend_down()
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        backend_down()
    }

    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        backend_down()
    }

    async fn mset(&self, _entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> Result<()> {
        backend_down()
    }

    async fn incr_by(&self, _key: &str, _amount: i64) -> Result<i64> {
        backend_down()
    }

    async fn decr_by(&self, _key: &str, _amount: i64) -> Result<i64> {
        backend_down()
    }

    async fn ping(&self) -> Result<()> {
        // Simulates a PING that never answers; health checks must time out
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "failing test backend".to_string()
    }
}

fn memory_service() -> CacheService {
    CacheService::new(Arc::new(MemoryBackend::new()), CacheSettings::default())
}

fn failing_service() -> CacheService {
    let settings = CacheSettings {
        health_ping_timeout: Duration::from_millis(100),
        ..CacheSettings::default()
    };
    CacheService::new(Arc::new(FailingBackend), settings)
}

#[tokio::test]
async fn test_set_then_get_round_trip() {
    let cache = memory_service();

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug, Clone)]
    struct Product {
        id: u64,
        name: String,
        price_cents: u64,
    }

    let product = Product {
        id: 42,
        name: "mechanical keyboard".to_string(),
        price_cents: 12999,
    };

    assert!(
        cache
            .set("product:42", &product, SetOptions::with_ttl(Duration::from_secs(60)))
            .await
    );

    let cached: Option<Product> = cache.get("product:42").await;
    assert_eq!(cached, Some(product));
}

#[tokio::test]
async fn test_miss_on_unknown_key_counts_once() {
    let cache = memory_service();

    let value: Option<String> = cache.get("never-set").await;
    assert_eq!(value, None);

    let stats = cache.get_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_set_with_ttl_expires() {
    let cache = memory_service();
    assert!(
        cache
            .set("flash-sale", &"ends soon", SetOptions::with_ttl(Duration::from_millis(20)))
            .await
    );
    assert!(cache.exists("flash-sale").await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let value: Option<String> = cache.get("flash-sale").await;
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_delete_reports_removal() {
    let cache = memory_service();
    assert!(cache.set("k", &1, SetOptions::default()).await);
    assert!(cache.delete("k").await);
    assert!(!cache.delete("k").await);
}

#[tokio::test]
async fn test_mset_then_mget_preserves_order() {
    let cache = memory_service();

    let entries = vec![
        MsetEntry {
            key: "cart:1".to_string(),
            value: "one".to_string(),
            options: SetOptions::default(),
        },
        MsetEntry {
            key: "cart:2".to_string(),
            value: "two".to_string(),
            options: SetOptions::with_ttl(Duration::from_secs(60)),
        },
    ];
    assert!(cache.mset(&entries).await);

    // Unrelated concurrent writes must not disturb the batch
    assert!(cache.set("other:a", &"x", SetOptions::default()).await);
    assert!(cache.set("other:b", &"y", SetOptions::default()).await);

    let values: Vec<Option<String>> = cache
        .mget(&["cart:1".to_string(), "cart:2".to_string()])
        .await;
    assert_eq!(values, vec![Some("one".to_string()), Some("two".to_string())]);
}

#[tokio::test]
async fn test_mget_mixes_hits_and_misses_in_order() {
    let cache = memory_service();
    assert!(cache.set("present", &"here", SetOptions::default()).await);

    let values: Vec<Option<String>> = cache
        .mget(&[
            "absent-1".to_string(),
            "present".to_string(),
            "absent-2".to_string(),
        ])
        .await;
    assert_eq!(values, vec![None, Some("here".to_string()), None]);

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_delete_by_pattern_removes_exactly_matches() {
    let cache = memory_service();
    assert!(cache.set("product:1", &1, SetOptions::default()).await);
    assert!(cache.set("product:2", &2, SetOptions::default()).await);
    assert!(cache.set("session:1", &3, SetOptions::default()).await);

    let removed = cache.delete_by_pattern("product:*").await;
    assert_eq!(removed, 2);

    let gone: Option<i32> = cache.get("product:1").await;
    assert_eq!(gone, None);
    let kept: Option<i32> = cache.get("session:1").await;
    assert_eq!(kept, Some(3));
}

#[tokio::test]
async fn test_delete_by_pattern_with_no_matches_is_zero() {
    let cache = memory_service();
    assert!(cache.set("session:1", &3, SetOptions::default()).await);

    assert_eq!(cache.delete_by_pattern("order:*").await, 0);
    assert!(cache.exists("session:1").await);
}

#[tokio::test]
async fn test_increment_and_decrement() {
    let cache = memory_service();
    assert_eq!(cache.increment("page-views", 1).await, 1);
    assert_eq!(cache.increment("page-views", 4).await, 5);
    assert_eq!(cache.decrement("page-views", 2).await, 3);
}

#[tokio::test]
async fn test_expire_and_ttl() {
    let cache = memory_service();
    assert!(cache.set("k", &"v", SetOptions::default()).await);
    assert_eq!(cache.ttl("k").await, -1);

    assert!(cache.expire("k", Duration::from_secs(100)).await);
    let remaining = cache.ttl("k").await;
    assert!(remaining > 0 && remaining <= 100);

    assert!(!cache.expire("missing", Duration::from_secs(10)).await);
}

#[tokio::test]
async fn test_healthy_backend_health_check() {
    let cache = memory_service();
    let health = cache.health_check().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.details.connected);
}

// A backend outage degrades every operation to its neutral return; nothing
// propagates an error to the caller.

#[tokio::test]
async fn test_outage_get_is_a_miss() {
    let cache = failing_service();
    let value: Option<String> = cache.get("anything").await;
    assert_eq!(value, None);

    let stats = cache.get_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_outage_writes_report_not_cached() {
    let cache = failing_service();
    assert!(!cache.set("k", &"v", SetOptions::default()).await);
    assert!(!cache.delete("k").await);
    assert!(!cache.exists("k").await);
    assert!(!cache.expire("k", Duration::from_secs(1)).await);
    assert_eq!(cache.ttl("k").await, -1);
    assert_eq!(cache.increment("k", 1).await, 0);
    assert_eq!(cache.decrement("k", 1).await, 0);
    assert_eq!(cache.keys("*").await, Vec::<String>::new());
    assert_eq!(cache.delete_by_pattern("*").await, 0);
}

#[tokio::test]
async fn test_outage_mget_returns_all_none_of_same_length() {
    let cache = failing_service();
    let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let values: Vec<Option<String>> = cache.mget(&keys).await;
    assert_eq!(values, vec![None, None, None]);
}

#[tokio::test]
async fn test_outage_health_check_is_unhealthy_not_a_panic() {
    let cache = failing_service();
    let health = cache.health_check().await;
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert!(!health.details.connected);
    assert!(health.details.error.is_some());
    // The probe timed out rather than waiting on the hung PING
    assert!(health.details.response_time_ms < 3000);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let cache = memory_service();
    assert!(cache.disconnect().await.is_ok());
    assert!(cache.disconnect().await.is_ok());
}
