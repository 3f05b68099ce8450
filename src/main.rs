use std::sync::Arc;
use storefront_cache::{
    cache::CacheService,
    config::Config,
    connection_pool::calculate_optimal_pool_size,
    health::{HealthManager, HealthStatus},
    logging::init_logging,
    operation_tracker::OperationTracker,
    redis_backend::RedisBackend,
    shutdown::{DefaultTaskHooks, ShutdownCoordinator, ShutdownOptions},
    Result,
};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let logger = Arc::new(init_logging(&config.logging)?);

    info!(
        "storefront-cache {} (built {})",
        env!("BUILD_VERSION"),
        env!("BUILD_TIMESTAMP")
    );

    let sizing = calculate_optimal_pool_size();
    info!(
        "Recommended pool sizing for this host: min={}, max={}, idle_timeout={:?}, acquire_timeout={:?}",
        sizing.min_connections, sizing.max_connections, sizing.idle_timeout, sizing.acquire_timeout
    );

    let backend = Arc::new(RedisBackend::new(config.backend.clone())?);
    if !config.backend.lazy_connect {
        backend.connect().await?;
    }

    let cache = Arc::new(CacheService::new(backend, config.cache.clone()));
    let operation_tracker = Arc::new(OperationTracker::new());

    let coordinator = Arc::new(ShutdownCoordinator::new(
        &config.shutdown,
        operation_tracker,
    ));
    coordinator.install_default_tasks(DefaultTaskHooks {
        cache_service: Some(cache.clone()),
        logger: Some(logger),
        ..DefaultTaskHooks::default()
    })?;

    let mut health_manager = HealthManager::new();
    health_manager.set_cache_service(cache);
    health_manager.set_shutdown_coordinator(coordinator.clone());

    let check_interval = config.health.check_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(check_interval);
        loop {
            interval.tick().await;
            let health = health_manager.check_health().await;
            match health.status {
                HealthStatus::Healthy => debug!("Health check passed"),
                status => warn!("Health check status: {:?}", status),
            }
        }
    });

    coordinator
        .listen_for_signals(ShutdownOptions::from(&config.shutdown))
        .await
}
