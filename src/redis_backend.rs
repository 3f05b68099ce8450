//! Redis Backend Module
//!
//! Redis implementation of the key-value backend capability. The connection is
//! established lazily on first use and shared: the connect attempt runs under
//! the handle lock, so concurrent first callers wait on one attempt instead of
//! each opening a redundant connection. All commands are bounded by the
//! configured command timeout.

use crate::backend::{BackendConfig, KeyValueBackend};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Result, ServiceError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Redis-backed key-value store
pub struct RedisBackend {
    client: redis::Client,
    config: BackendConfig,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Create a backend from configuration without connecting.
    ///
    /// The connection itself is opened on the first operation (or via
    /// [`connect`](Self::connect) when eager connection is configured).
    pub fn new(config: BackendConfig) -> Result<Self> {
        config
            .validate()
            .map_err(ServiceError::ConfigError)?;

        let client = redis::Client::open(connection_url(&config).as_str())
            .map_err(|e| ServiceError::ConnectionError(format!("Invalid backend address: {}", e)))?;

        Ok(Self {
            client,
            config,
            connection: Mutex::new(None),
        })
    }

    /// Eagerly establish the connection
    pub async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.config.host, self.config.port, self.config.db)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn strip_prefix(&self, key: &str) -> String {
        key.strip_prefix(&self.config.key_prefix)
            .unwrap_or(key)
            .to_string()
    }

    /// Get the shared connection, opening it on first use.
    ///
    /// Holding the handle lock across the connect attempt is what makes the
    /// first connection single-flight.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let retry_config = RetryConfig {
            max_attempts: self.config.max_retries_per_request.max(1),
            ..RetryConfig::default()
        };
        let client = self.client.clone();
        let connect_timeout = self.config.connect_timeout;

        let conn = retry_with_backoff(&retry_config, "backend connect", || {
            let client = client.clone();
            async move {
                match timeout(connect_timeout, client.get_multiplexed_async_connection()).await {
                    Ok(result) => result.map_err(ServiceError::from),
                    Err(_) => Err(ServiceError::TimeoutError(format!(
                        "Backend connect timed out after {:?}",
                        connect_timeout
                    ))),
                }
            }
        })
        .await?;

        info!("Connected to backend store at {}", self.endpoint());
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Run a backend command bounded by the configured command timeout
    async fn run_command<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.config.command_timeout, fut).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::TimeoutError(format!(
                "{} timed out after {:?}",
                operation, self.config.command_timeout
            ))),
        }
    }
}

fn connection_url(config: &BackendConfig) -> String {
    match &config.password {
        Some(password) => format!(
            "redis://:{}@{}:{}/{}",
            password, config.host, config.port, config.db
        ),
        None => format!("redis://{}:{}/{}", config.host, config.port, config.db),
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        self.run_command("GET", async move {
            let value: Option<Vec<u8>> = conn.get(&key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        self.run_command("SET", async move {
            let _: () = conn.set(&key, value).await?;
            Ok(())
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        let seconds = ttl.as_secs().max(1);
        self.run_command("SETEX", async move {
            let _: () = conn.set_ex(&key, value, seconds).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        self.run_command("DEL", async move {
            let removed: u64 = conn.del(&keys).await?;
            Ok(removed)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        self.run_command("EXISTS", async move {
            let exists: bool = conn.exists(&key).await?;
            Ok(exists)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        let seconds = ttl.as_secs().max(1) as i64;
        self.run_command("EXPIRE", async move {
            let applied: bool = conn.expire(&key, seconds).await?;
            Ok(applied)
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        self.run_command("TTL", async move {
            let remaining: i64 = conn.ttl(&key).await?;
            Ok(remaining)
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let pattern = self.full_key(pattern);
        let matched = self
            .run_command("KEYS", async move {
                let keys: Vec<String> = conn.keys(&pattern).await?;
                Ok(keys)
            })
            .await?;
        Ok(matched.iter().map(|k| self.strip_prefix(k)).collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        self.run_command("MGET", async move {
            let values: Vec<Option<Vec<u8>>> = conn.mget(&keys).await?;
            Ok(values)
        })
        .await
    }

    async fn mset(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value, ttl) in entries {
            let key = self.full_key(&key);
            match ttl {
                Some(ttl) => {
                    pipe.cmd("SET")
                        .arg(&key)
                        .arg(value)
                        .arg("EX")
                        .arg(ttl.as_secs().max(1))
                        .ignore();
                }
                None => {
                    pipe.cmd("SET").arg(&key).arg(value).ignore();
                }
            }
        }

        self.run_command("MSET pipeline", async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        self.run_command("INCRBY", async move {
            let value: i64 = conn.incr(&key, amount).await?;
            Ok(value)
        })
        .await
    }

    async fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut conn = self.connection().await?;
        let key = self.full_key(key);
        self.run_command("DECRBY", async move {
            let value: i64 = conn.decr(&key, amount).await?;
            Ok(value)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong = self
            .run_command("PING", async move {
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(pong)
            })
            .await?;

        if pong != "PONG" {
            warn!("Unexpected PING response from backend: {}", pong);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.connection.lock().await;
        if guard.take().is_some() {
            info!("Disconnected from backend store at {}", self.endpoint());
        } else {
            debug!("Backend disconnect requested but no connection was open");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "redis://{} (prefix '{}')",
            self.endpoint(),
            self.config.key_prefix
        )
    }
}
