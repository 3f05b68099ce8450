//! Cache Service Module
//!
//! Multi-operation cache API over the key-value backend adapter, with
//! TTL-wrapped serialization, optional payload compression, and per-operation
//! statistics. Every public operation isolates backend failure into a logged,
//! counted, neutral return: an unavailable cache degrades reads to misses and
//! writes to no-ops, it never takes the calling service down with it.

use crate::backend::KeyValueBackend;
use crate::cache_stats::{CacheStats, CacheStatsTracker};
use crate::compression::{compress_payload, decompress_payload};
use crate::config::CacheSettings;
use crate::health::HealthStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Envelope wrapped around every cached value.
///
/// The envelope is what actually lands in the backend, serialized as JSON and
/// optionally LZ4-compressed as a whole. Foreign writers that store bare
/// values are tolerated on the read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Write time in epoch milliseconds
    pub timestamp: i64,
    /// TTL requested at write time; 0 means no expiry was requested
    pub ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub compressed: bool,
}

/// Per-write options for [`CacheService::set`] and [`CacheService::mset`]
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub tags: Option<Vec<String>>,
    /// Request compression for this entry (still subject to the size threshold)
    pub compress: bool,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }
}

/// One entry of a batch write
pub struct MsetEntry<T> {
    pub key: String,
    pub value: T,
    pub options: SetOptions,
}

/// Cache health probe result
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub details: CacheHealthDetails,
}

/// Details backing the cache health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealthDetails {
    pub connected: bool,
    pub response_time_ms: u64,
    pub stats: CacheStats,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cache service over a pluggable key-value backend
pub struct CacheService {
    backend: Arc<dyn KeyValueBackend>,
    stats: CacheStatsTracker,
    settings: CacheSettings,
}

impl CacheService {
    pub fn new(backend: Arc<dyn KeyValueBackend>, settings: CacheSettings) -> Self {
        Self {
            backend,
            stats: CacheStatsTracker::new(),
            settings,
        }
    }

    /// Read a value; `None` covers miss, expiry, and backend failure alike
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => self.decode_payload(key, &raw),
            Ok(None) => {
                self.stats.record_miss();
                debug!("Cache miss for key '{}'", key);
                None
            }
            Err(e) => {
                self.stats.record_error();
                warn!("Cache get failed for key '{}': {} (treating as miss)", key, e);
                None
            }
        }
    }

    /// Write a value; returns true only when the backend acknowledged it
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        let payload = match self.encode_payload(key, value, &options) {
            Some(payload) => payload,
            None => return false,
        };

        let result = match options.ttl {
            Some(ttl) => self.backend.set_with_ttl(key, payload, ttl).await,
            None => self.backend.set(key, payload).await,
        };

        match result {
            Ok(()) => {
                self.stats.record_set();
                true
            }
            Err(e) => {
                self.stats.record_error();
                warn!("Cache set failed for key '{}': {}", key, e);
                false
            }
        }
    }

    /// Delete a key; true iff the backend reports something was removed
    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(&[key.to_string()]).await {
            Ok(removed) => {
                if removed > 0 {
                    self.stats.record_delete();
                }
                removed > 0
            }
            Err(e) => {
                self.stats.record_error();
                warn!("Cache delete failed for key '{}': {}", key, e);
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.backend.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                self.stats.record_error();
                warn!("Cache exists check failed for key '{}': {}", key, e);
                false
            }
        }
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.backend.expire(key, ttl).await {
            Ok(applied) => applied,
            Err(e) => {
                self.stats.record_error();
                warn!("Cache expire failed for key '{}': {}", key, e);
                false
            }
        }
    }

    /// Remaining TTL in whole seconds; -1 when the key is absent or has no expiry
    pub async fn ttl(&self, key: &str) -> i64 {
        match self.backend.ttl(key).await {
            Ok(remaining) if remaining >= 0 => remaining,
            Ok(_) => -1,
            Err(e) => {
                self.stats.record_error();
                warn!("Cache ttl lookup failed for key '{}': {}", key, e);
                -1
            }
        }
    }

    /// Batch read preserving input order; a backend failure yields an
    /// all-`None` vector of the same length
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        match self.backend.mget(keys).await {
            Ok(raws) => raws
                .into_iter()
                .zip(keys)
                .map(|(raw, key)| match raw {
                    Some(raw) => self.decode_payload(key, &raw),
                    None => {
                        self.stats.record_miss();
                        None
                    }
                })
                .collect(),
            Err(e) => {
                self.stats.record_error();
                warn!("Cache mget failed for {} keys: {}", keys.len(), e);
                keys.iter().map(|_| None).collect()
            }
        }
    }

    /// Batch write as one atomic pipeline; true only when the whole batch
    /// was acknowledged
    pub async fn mset<T: Serialize>(&self, entries: &[MsetEntry<T>]) -> bool {
        let mut batch = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.encode_payload(&entry.key, &entry.value, &entry.options) {
                Some(payload) => batch.push((entry.key.clone(), payload, entry.options.ttl)),
                None => return false,
            }
        }

        match self.backend.mset(batch).await {
            Ok(()) => {
                for _ in entries {
                    self.stats.record_set();
                }
                true
            }
            Err(e) => {
                self.stats.record_error();
                warn!("Cache mset failed for {} entries: {}", entries.len(), e);
                false
            }
        }
    }

    /// Keys matching a backend-native glob pattern
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        match self.backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.stats.record_error();
                warn!("Cache keys lookup failed for pattern '{}': {}", pattern, e);
                Vec::new()
            }
        }
    }

    /// Delete every key matching the pattern, returning how many were removed.
    /// No matches is a normal 0, not an error.
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        let matched = match self.backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.stats.record_error();
                warn!(
                    "Cache pattern resolution failed for '{}': {}",
                    pattern, e
                );
                return 0;
            }
        };

        if matched.is_empty() {
            debug!("No keys matched pattern '{}'", pattern);
            return 0;
        }

        match self.backend.delete(&matched).await {
            Ok(removed) => {
                for _ in 0..removed {
                    self.stats.record_delete();
                }
                debug!("Deleted {} keys matching pattern '{}'", removed, pattern);
                removed
            }
            Err(e) => {
                self.stats.record_error();
                warn!("Cache pattern delete failed for '{}': {}", pattern, e);
                0
            }
        }
    }

    /// Atomic numeric increment; 0 on backend failure
    pub async fn increment(&self, key: &str, amount: i64) -> i64 {
        match self.backend.incr_by(key, amount).await {
            Ok(value) => value,
            Err(e) => {
                self.stats.record_error();
                warn!("Cache increment failed for key '{}': {}", key, e);
                0
            }
        }
    }

    /// Atomic numeric decrement; 0 on backend failure
    pub async fn decrement(&self, key: &str, amount: i64) -> i64 {
        match self.backend.decr_by(key, amount).await {
            Ok(value) => value,
            Err(e) => {
                self.stats.record_error();
                warn!("Cache decrement failed for key '{}': {}", key, e);
                0
            }
        }
    }

    /// Bounded connectivity probe with round-trip measurement; never errors
    pub async fn health_check(&self) -> CacheHealth {
        let start = Instant::now();
        let probe = timeout(self.settings.health_ping_timeout, self.backend.ping()).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (status, connected, error) = match probe {
            Ok(Ok(())) => (HealthStatus::Healthy, true, None),
            Ok(Err(e)) => (HealthStatus::Unhealthy, false, Some(e.to_string())),
            Err(_) => (
                HealthStatus::Unhealthy,
                false,
                Some(format!(
                    "Ping timed out after {:?}",
                    self.settings.health_ping_timeout
                )),
            ),
        };

        if status != HealthStatus::Healthy {
            warn!(
                "Cache backend unhealthy ({}): {}",
                self.backend.describe(),
                error.as_deref().unwrap_or("unknown")
            );
        }

        CacheHealth {
            status,
            details: CacheHealthDetails {
                connected,
                response_time_ms,
                stats: self.stats.snapshot(),
                backend: self.backend.describe(),
                error,
            },
        }
    }

    /// Read-only statistics snapshot
    pub fn get_stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Close the backend connection; idempotent
    pub async fn disconnect(&self) -> crate::Result<()> {
        self.backend.disconnect().await
    }

    /// Serialize a value into its envelope, compressing above the threshold
    /// when the write opts in. Serialization failure is contained like any
    /// backend failure: counted, logged, and surfaced as `None`.
    fn encode_payload<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: &SetOptions,
    ) -> Option<Vec<u8>> {
        let mut entry = CacheEntry {
            value,
            timestamp: chrono::Utc::now().timestamp_millis(),
            ttl_seconds: options.ttl.map(|t| t.as_secs()).unwrap_or(0),
            tags: options.tags.clone(),
            compressed: false,
        };

        let mut serialized = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.record_error();
                warn!("Failed to serialize cache entry for key '{}': {}", key, e);
                return None;
            }
        };

        let should_compress = options.compress
            && self.settings.compression_enabled
            && serialized.len() >= self.settings.compression_threshold;

        if should_compress {
            entry.compressed = true;
            serialized = match serde_json::to_vec(&entry) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.stats.record_error();
                    warn!("Failed to serialize cache entry for key '{}': {}", key, e);
                    return None;
                }
            };
            match compress_payload(&serialized) {
                Ok(compressed) => serialized = compressed,
                Err(e) => {
                    // Failed compression falls back to the uncompressed form
                    warn!("Compression failed for key '{}': {}, storing uncompressed", key, e);
                    entry.compressed = false;
                    serialized = serde_json::to_vec(&entry).ok()?;
                }
            }
        }

        Some(serialized)
    }

    /// Decode a raw backend payload, tolerating foreign writers that stored
    /// bare JSON values or plain strings instead of the envelope
    fn decode_payload<T: DeserializeOwned>(&self, key: &str, raw: &[u8]) -> Option<T> {
        let payload = match decompress_payload(raw) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.record_error();
                warn!("Failed to decompress cache entry for key '{}': {}", key, e);
                return None;
            }
        };

        if let Ok(entry) = serde_json::from_slice::<CacheEntry<T>>(&payload) {
            self.stats.record_hit();
            return Some(entry.value);
        }

        // Foreign writer: bare JSON value
        if let Ok(value) = serde_json::from_slice::<T>(&payload) {
            self.stats.record_hit();
            return Some(value);
        }

        // Foreign writer: raw string payload
        if let Ok(text) = std::str::from_utf8(&payload) {
            if let Ok(value) = serde_json::from_value::<T>(serde_json::Value::String(text.to_string())) {
                self.stats.record_hit();
                return Some(value);
            }
        }

        self.stats.record_error();
        warn!("Undecodable cache entry for key '{}'", key);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;

    fn service() -> CacheService {
        CacheService::new(Arc::new(MemoryBackend::new()), CacheSettings::default())
    }

    #[tokio::test]
    async fn test_envelope_round_trip() {
        let cache = service();
        assert!(cache.set("greeting", &"hello".to_string(), SetOptions::default()).await);
        let value: Option<String> = cache.get("greeting").await;
        assert_eq!(value, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_foreign_bare_json_is_readable() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheService::new(backend.clone(), CacheSettings::default());

        // Another service wrote a bare value without the envelope
        crate::backend::KeyValueBackend::set(backend.as_ref(), "foreign", b"[1,2,3]".to_vec())
            .await
            .unwrap();

        let value: Option<Vec<i32>> = cache.get("foreign").await;
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_foreign_raw_string_is_readable() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheService::new(backend.clone(), CacheSettings::default());

        crate::backend::KeyValueBackend::set(backend.as_ref(), "raw", b"not json at all".to_vec())
            .await
            .unwrap();

        let value: Option<String> = cache.get("raw").await;
        assert_eq!(value, Some("not json at all".to_string()));
    }

    #[tokio::test]
    async fn test_compression_kicks_in_above_threshold() {
        let settings = CacheSettings {
            compression_threshold: 128,
            ..CacheSettings::default()
        };
        let backend = Arc::new(MemoryBackend::new());
        let cache = CacheService::new(backend.clone(), settings);

        let big = "x".repeat(10_000);
        let options = SetOptions {
            compress: true,
            ..SetOptions::default()
        };
        assert!(cache.set("big", &big, options).await);

        let stored = crate::backend::KeyValueBackend::get(backend.as_ref(), "big")
            .await
            .unwrap()
            .unwrap();
        assert!(crate::compression::is_compressed(&stored));
        assert!(stored.len() < big.len());

        let value: Option<String> = cache.get("big").await;
        assert_eq!(value, Some(big));
    }

    #[tokio::test]
    async fn test_ttl_normalization() {
        let cache = service();
        assert!(cache.set("no-expiry", &1, SetOptions::default()).await);
        assert_eq!(cache.ttl("no-expiry").await, -1);
        assert_eq!(cache.ttl("missing").await, -1);
    }
}
