//! Configuration Module
//!
//! Handles configuration loading from YAML files, environment variables, and
//! command-line arguments, with validation at startup.

use crate::backend::BackendConfig;
use crate::{Result, ServiceError};
use clap::{Arg, Command};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Custom deserializer for Duration from string format like "30s", "5m", "1h"
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty duration string".to_string());
        }

        let mut num_end = 0;
        for (i, c) in s.chars().enumerate() {
            if c.is_ascii_digit() || c == '.' {
                num_end = i + 1;
            } else {
                break;
            }
        }

        if num_end == 0 {
            return Err(format!("No number found in duration string: {}", s));
        }

        let num_str = &s[..num_end];
        let unit = s[num_end..].trim();

        let value: f64 = num_str
            .parse()
            .map_err(|e| format!("Failed to parse number '{}': {}", num_str, e))?;

        let duration = match unit {
            "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs_f64(value),
            "m" | "min" | "mins" | "minute" | "minutes" => Duration::from_secs_f64(value * 60.0),
            "h" | "hr" | "hrs" | "hour" | "hours" => Duration::from_secs_f64(value * 3600.0),
            "ms" | "millis" | "millisecond" | "milliseconds" => {
                Duration::from_secs_f64(value / 1000.0)
            }
            "" => Duration::from_secs_f64(value),
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(duration)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Cache service behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Compress payloads once their serialized size reaches this many bytes
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    /// Allow compression at all; individual writes still opt in per entry
    #[serde(default = "default_compression_enabled")]
    pub compression_enabled: bool,
    /// Bound on the connectivity probe issued by health checks
    #[serde(
        deserialize_with = "duration_serde::deserialize",
        default = "default_health_ping_timeout"
    )]
    pub health_ping_timeout: Duration,
}

fn default_compression_threshold() -> usize {
    4096
}

fn default_compression_enabled() -> bool {
    true
}

fn default_health_ping_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            compression_threshold: default_compression_threshold(),
            compression_enabled: default_compression_enabled(),
            health_ping_timeout: default_health_ping_timeout(),
        }
    }
}

impl CacheSettings {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.compression_threshold < 64 {
            return Err(format!(
                "Compression threshold must be at least 64 bytes, got {}",
                self.compression_threshold
            ));
        }
        Ok(())
    }
}

/// Graceful shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Overall budget for the shutdown task sequence
    #[serde(
        deserialize_with = "duration_serde::deserialize",
        default = "default_graceful_timeout"
    )]
    pub graceful_timeout: Duration,
    /// Hard-exit backstop, armed only when `allow_force_exit` is set
    #[serde(
        deserialize_with = "duration_serde::deserialize",
        default = "default_force_timeout"
    )]
    pub force_timeout: Duration,
    #[serde(default)]
    pub allow_force_exit: bool,
    /// How long the drain step waits for in-flight operations
    #[serde(
        deserialize_with = "duration_serde::deserialize",
        default = "default_drain_timeout"
    )]
    pub drain_timeout: Duration,
    #[serde(
        deserialize_with = "duration_serde::deserialize",
        default = "default_drain_poll_interval"
    )]
    pub drain_poll_interval: Duration,
}

fn default_graceful_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_force_timeout() -> Duration {
    Duration::from_secs(45)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_drain_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: default_graceful_timeout(),
            force_timeout: default_force_timeout(),
            allow_force_exit: false,
            drain_timeout: default_drain_timeout(),
            drain_poll_interval: default_drain_poll_interval(),
        }
    }
}

impl ShutdownConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.graceful_timeout.is_zero() {
            return Err("Graceful shutdown timeout must be greater than zero".to_string());
        }

        if self.force_timeout <= self.graceful_timeout {
            return Err(format!(
                "Force timeout ({:?}) must exceed the graceful timeout ({:?})",
                self.force_timeout, self.graceful_timeout
            ));
        }

        if self.drain_poll_interval.is_zero() {
            return Err("Drain poll interval must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write a JSON log file in addition to console output
    #[serde(default)]
    pub file_enabled: bool,
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("log")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: false,
            directory: default_log_directory(),
        }
    }
}

impl LoggingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }
}

/// Health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(
        deserialize_with = "duration_serde::deserialize",
        default = "default_check_interval"
    )]
    pub check_interval: Duration,
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
        }
    }
}

impl Config {
    /// Load configuration from CLI arguments, an optional YAML file, and
    /// environment variable overrides, then validate it.
    pub fn load() -> Result<Self> {
        let matches = Self::build_cli().get_matches();

        let mut config = if let Some(config_path) = matches.get_one::<String>("config") {
            Self::load_from_file(config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&matches);
        config.validate()?;

        info!(
            "Backend store: {}:{}/{} (prefix '{}', lazy_connect={})",
            config.backend.host,
            config.backend.port,
            config.backend.db,
            config.backend.key_prefix,
            config.backend.lazy_connect
        );
        info!(
            "Shutdown budget: graceful={}s, force={}s (force_exit={}), drain={}s",
            config.shutdown.graceful_timeout.as_secs(),
            config.shutdown.force_timeout.as_secs(),
            config.shutdown.allow_force_exit,
            config.shutdown.drain_timeout.as_secs()
        );
        if config.cache.compression_enabled {
            info!(
                "Payload compression enabled above {} bytes",
                config.cache.compression_threshold
            );
        }

        Ok(config)
    }

    /// Validate every configuration section
    pub fn validate(&self) -> Result<()> {
        self.backend
            .validate()
            .map_err(|e| ServiceError::ConfigError(format!("Invalid backend configuration: {}", e)))?;
        self.cache
            .validate()
            .map_err(|e| ServiceError::ConfigError(format!("Invalid cache configuration: {}", e)))?;
        self.shutdown
            .validate()
            .map_err(|e| ServiceError::ConfigError(format!("Invalid shutdown configuration: {}", e)))?;
        self.logging
            .validate()
            .map_err(|e| ServiceError::ConfigError(format!("Invalid logging configuration: {}", e)))?;
        Ok(())
    }

    fn build_cli() -> Command {
        Command::new("storefront-cache")
            .about("Redis-backed cache service with graceful shutdown for storefront microservices")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Path to a YAML configuration file"),
            )
            .arg(
                Arg::new("log-level")
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level: trace, debug, info, warn, error"),
            )
            .arg(
                Arg::new("backend-host")
                    .long("backend-host")
                    .value_name("HOST")
                    .help("Backend store hostname"),
            )
            .arg(
                Arg::new("backend-port")
                    .long("backend-port")
                    .value_name("PORT")
                    .help("Backend store port"),
            )
    }

    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::ConfigError(format!("Failed to read config file {}: {}", path, e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            ServiceError::ConfigError(format!("Failed to parse config file {}: {}", path, e))
        })?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("STOREFRONT_BACKEND_HOST") {
            self.backend.host = host;
        }
        if let Ok(port) = std::env::var("STOREFRONT_BACKEND_PORT") {
            match port.parse() {
                Ok(port) => self.backend.port = port,
                Err(_) => warn!("Ignoring invalid STOREFRONT_BACKEND_PORT: {}", port),
            }
        }
        if let Ok(password) = std::env::var("STOREFRONT_BACKEND_PASSWORD") {
            self.backend.password = Some(password);
        }
        if let Ok(db) = std::env::var("STOREFRONT_BACKEND_DB") {
            match db.parse() {
                Ok(db) => self.backend.db = db,
                Err(_) => warn!("Ignoring invalid STOREFRONT_BACKEND_DB: {}", db),
            }
        }
        if let Ok(prefix) = std::env::var("STOREFRONT_KEY_PREFIX") {
            self.backend.key_prefix = prefix;
        }
        if let Ok(level) = std::env::var("STOREFRONT_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn apply_cli_overrides(&mut self, matches: &clap::ArgMatches) {
        if let Some(level) = matches.get_one::<String>("log-level") {
            self.logging.level = level.clone();
        }
        if let Some(host) = matches.get_one::<String>("backend-host") {
            self.backend.host = host.clone();
        }
        if let Some(port) = matches.get_one::<String>("backend-port") {
            match port.parse() {
                Ok(port) => self.backend.port = port,
                Err(_) => warn!("Ignoring invalid --backend-port: {}", port),
            }
        }
    }
}
