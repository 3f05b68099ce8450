//! Health Check Module
//!
//! Health snapshot types and a manager that aggregates component probes into
//! an overall system status. The snapshots are plain serializable structs so
//! the owning application can expose them on whatever surface it serves.

use crate::cache::CacheService;
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub last_check: SystemTime,
    pub response_time_ms: Option<u64>,
}

/// Overall system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub timestamp: SystemTime,
    pub components: Vec<ComponentHealth>,
    pub uptime_seconds: u64,
}

/// Health check manager
pub struct HealthManager {
    start_time: SystemTime,
    cache_service: Option<Arc<CacheService>>,
    shutdown_coordinator: Option<Arc<ShutdownCoordinator>>,
}

impl Default for HealthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthManager {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            cache_service: None,
            shutdown_coordinator: None,
        }
    }

    /// Set cache service reference
    pub fn set_cache_service(&mut self, cache_service: Arc<CacheService>) {
        self.cache_service = Some(cache_service);
    }

    /// Set shutdown coordinator reference
    pub fn set_shutdown_coordinator(&mut self, coordinator: Arc<ShutdownCoordinator>) {
        self.shutdown_coordinator = Some(coordinator);
    }

    /// Probe every registered component and aggregate the worst status
    pub async fn check_health(&self) -> SystemHealth {
        let mut components = Vec::new();

        if let Some(cache_service) = &self.cache_service {
            components.push(Self::check_cache_health(cache_service).await);
        }

        if let Some(coordinator) = &self.shutdown_coordinator {
            components.push(Self::check_lifecycle_health(coordinator));
        }

        let status = components
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, |worst, status| {
                match (worst, status) {
                    (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => {
                        HealthStatus::Unhealthy
                    }
                    (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => {
                        HealthStatus::Degraded
                    }
                    _ => HealthStatus::Healthy,
                }
            });

        SystemHealth {
            status,
            timestamp: SystemTime::now(),
            components,
            uptime_seconds: self
                .start_time
                .elapsed()
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    async fn check_cache_health(cache_service: &Arc<CacheService>) -> ComponentHealth {
        let health = cache_service.health_check().await;
        ComponentHealth {
            name: "cache".to_string(),
            status: health.status,
            message: health.details.error.clone(),
            last_check: SystemTime::now(),
            response_time_ms: Some(health.details.response_time_ms),
        }
    }

    fn check_lifecycle_health(coordinator: &Arc<ShutdownCoordinator>) -> ComponentHealth {
        let status = coordinator.get_status();
        let (health, message) = match status.state {
            ShutdownState::Idle => (HealthStatus::Healthy, None),
            ShutdownState::Draining | ShutdownState::ExecutingTasks => (
                HealthStatus::Degraded,
                Some("shutdown in progress".to_string()),
            ),
            ShutdownState::Exited => {
                (HealthStatus::Unhealthy, Some("shutdown complete".to_string()))
            }
        };

        ComponentHealth {
            name: "lifecycle".to_string(),
            status: health,
            message,
            last_check: SystemTime::now(),
            response_time_ms: None,
        }
    }
}
