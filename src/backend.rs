//! Backend Adapter Module
//!
//! Defines the key-value capability the cache service depends on. The service
//! is written against this trait, not against a concrete store, so production
//! runs against Redis while tests run against the in-process backend.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capability contract for a remote key-value store with TTL support.
///
/// Values are binary-safe byte payloads; the cache service layers its
/// serialization envelope on top. Implementations are expected to apply any
/// key namespacing internally and report keys back without it.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Atomic set-with-expiry
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete one or more keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Set a TTL on an existing key; false if the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining TTL in seconds; -1 for a key with no expiry, -2 for a missing key
    async fn ttl(&self, key: &str) -> Result<i64>;

    /// Keys matching a glob-style pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Batch get preserving input order
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Batch set executed as a single atomic pipeline
    async fn mset(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> Result<()>;

    /// Atomic numeric increment; the key is created at 0 when absent
    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Atomic numeric decrement; the key is created at 0 when absent
    async fn decr_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Lightweight connectivity probe
    async fn ping(&self) -> Result<()>;

    /// Close the underlying connection; idempotent, safe when never connected
    async fn disconnect(&self) -> Result<()>;

    /// Short human-readable description for health reporting
    fn describe(&self) -> String;
}

/// Connection settings for the remote backend store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index
    #[serde(default)]
    pub db: i64,
    /// Namespace prepended to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_max_retries")]
    pub max_retries_per_request: u32,
    /// Defer connecting until the first operation
    #[serde(default = "default_lazy_connect")]
    pub lazy_connect: bool,
    #[serde(
        deserialize_with = "crate::config::duration_serde::deserialize",
        default = "default_keepalive"
    )]
    pub keepalive: Duration,
    #[serde(
        deserialize_with = "crate::config::duration_serde::deserialize",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,
    #[serde(
        deserialize_with = "crate::config::duration_serde::deserialize",
        default = "default_command_timeout"
    )]
    pub command_timeout: Duration,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "storefront:".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_lazy_connect() -> bool {
    true
}

fn default_keepalive() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            db: 0,
            key_prefix: default_key_prefix(),
            max_retries_per_request: default_max_retries(),
            lazy_connect: default_lazy_connect(),
            keepalive: default_keepalive(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl BackendConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.host.is_empty() {
            return Err("Backend host cannot be empty".to_string());
        }

        if self.port == 0 {
            return Err("Backend port cannot be 0".to_string());
        }

        if self.db < 0 {
            return Err(format!("Backend db index cannot be negative, got {}", self.db));
        }

        if self.connect_timeout.is_zero() {
            return Err("Backend connect timeout must be greater than zero".to_string());
        }

        if self.command_timeout.is_zero() {
            return Err("Backend command timeout must be greater than zero".to_string());
        }

        Ok(())
    }
}
