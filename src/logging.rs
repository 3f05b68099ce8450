//! Logging Module
//!
//! Initializes structured tracing output to the console and, optionally, a
//! JSON log file through a non-blocking appender. The appender's buffered
//! writer is owned by [`LoggerManager`] so the shutdown sequence can flush it.

use crate::config::LoggingConfig;
use crate::{Result, ServiceError};
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Owns the buffered log writer so it can be flushed during shutdown
pub struct LoggerManager {
    guard: Mutex<Option<WorkerGuard>>,
}

impl LoggerManager {
    /// Flush any buffered log output.
    ///
    /// Dropping the worker guard blocks until the non-blocking writer has
    /// drained its queue. Safe to call more than once and when file logging
    /// was never enabled.
    pub fn flush(&self) {
        let taken = self.guard.lock().map(|mut g| g.take()).unwrap_or(None);
        match taken {
            Some(guard) => {
                drop(guard);
                debug!("Buffered log output flushed");
            }
            None => debug!("No buffered log writer to flush"),
        }
    }
}

/// Initialize tracing with console output and an optional JSON file layer.
///
/// Falls back to continuing quietly if a global subscriber is already set,
/// which happens when the library is embedded in a host that configured its
/// own logging.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggerManager> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(console_filter);

    let mut guard = None;

    if config.file_enabled {
        std::fs::create_dir_all(&config.directory).map_err(|e| {
            ServiceError::IoError(format!(
                "Failed to create log directory {}: {}",
                config.directory.display(),
                e
            ))
        })?;

        let file_appender = tracing_appender::rolling::daily(&config.directory, "storefront-cache.log");
        let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .json()
            .with_filter(EnvFilter::new(config.level.clone()));

        let init_result = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();
        if init_result.is_err() {
            debug!("Global tracing subscriber already initialized, keeping existing one");
        }
    } else {
        let init_result = tracing_subscriber::registry().with(console_layer).try_init();
        if init_result.is_err() {
            debug!("Global tracing subscriber already initialized, keeping existing one");
        }
    }

    info!(
        "Logging initialized (level: {}, file output: {})",
        config.level, config.file_enabled
    );

    Ok(LoggerManager {
        guard: Mutex::new(guard),
    })
}
