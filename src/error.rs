//! Error Module
//!
//! Defines error types and result types used throughout the storefront cache service.

use thiserror::Error;

/// Main error type for the cache service
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ServiceError {
    fn from(err: serde_yaml::Error) -> Self {
        ServiceError::ConfigError(err.to_string())
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            ServiceError::TimeoutError(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() {
            ServiceError::ConnectionError(err.to_string())
        } else {
            ServiceError::BackendError(err.to_string())
        }
    }
}

/// Result type alias for the cache service
pub type Result<T> = std::result::Result<T, ServiceError>;
