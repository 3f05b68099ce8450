//! Graceful Shutdown Module
//!
//! Coordinates orderly process termination: stop accepting new work, wait
//! (bounded) for in-flight operations to drain, run registered cleanup tasks
//! in priority order under an escalating timeout ladder, then exit. A task
//! that fails or times out is logged and skipped; partial cleanup is
//! preferable to no cleanup, and nothing may block termination forever.

use crate::cache::CacheService;
use crate::config::ShutdownConfig;
use crate::logging::LoggerManager;
use crate::operation_tracker::OperationTracker;
use crate::{Result, ServiceError};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Default per-task timeout when a registration does not specify one
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown lifecycle states; transitions are one-directional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownState {
    Idle = 0,
    Draining = 1,
    ExecutingTasks = 2,
    Exited = 3,
}

impl From<u8> for ShutdownState {
    fn from(value: u8) -> Self {
        match value {
            0 => ShutdownState::Idle,
            1 => ShutdownState::Draining,
            2 => ShutdownState::ExecutingTasks,
            _ => ShutdownState::Exited,
        }
    }
}

/// Options controlling one shutdown run
#[derive(Debug, Clone)]
pub struct ShutdownOptions {
    /// Overall budget for the task sequence
    pub graceful_timeout: Duration,
    /// Unconditional exit deadline, armed only with `allow_force_exit`
    pub force_timeout: Duration,
    pub allow_force_exit: bool,
    /// Critical triggers (uncaught faults) exit with code 1 instead of 0
    pub critical: bool,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(30),
            force_timeout: Duration::from_secs(45),
            allow_force_exit: false,
            critical: false,
        }
    }
}

impl From<&ShutdownConfig> for ShutdownOptions {
    fn from(config: &ShutdownConfig) -> Self {
        Self {
            graceful_timeout: config.graceful_timeout,
            force_timeout: config.force_timeout,
            allow_force_exit: config.allow_force_exit,
            critical: false,
        }
    }
}

/// Boxed zero-argument async cleanup action
pub type TaskAction = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named, prioritized, timeout-bound cleanup task
pub struct ShutdownTask {
    pub name: String,
    pub priority: i32,
    pub timeout: Duration,
    action: TaskAction,
}

/// Registered-task metadata for the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub priority: i32,
    pub timeout_ms: u64,
}

/// Status snapshot for operational dashboards and health probes
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownStatus {
    pub state: ShutdownState,
    pub started_at: Option<DateTime<Utc>>,
    pub active_operation_ids: Vec<String>,
    pub registered_tasks: Vec<TaskInfo>,
}

/// Process termination seam. Production uses [`SystemExit`]; tests inject a
/// recorder so the exit code is observable instead of fatal.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Terminates the process for real
pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Optional component hooks consumed by the built-in task set
#[derive(Default)]
pub struct DefaultTaskHooks {
    pub cache_service: Option<Arc<CacheService>>,
    pub logger: Option<Arc<LoggerManager>>,
    /// Releases any domain-specific exclusive locks
    pub release_locks: Option<TaskAction>,
    /// Tears down event-listener/subscription registries
    pub teardown_listeners: Option<TaskAction>,
    /// Additional pooled-connection closers run by the close-connections task
    pub pool_closers: Vec<TaskAction>,
}

/// Shutdown coordinator for graceful system shutdown
pub struct ShutdownCoordinator {
    state: AtomicU8,
    accepting: Arc<AtomicBool>,
    tasks: Mutex<Vec<ShutdownTask>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    operation_tracker: Arc<OperationTracker>,
    drain_timeout: Duration,
    drain_poll_interval: Duration,
    exit_handler: Arc<dyn ProcessExit>,
    done_tx: tokio::sync::watch::Sender<bool>,
    done_rx: tokio::sync::watch::Receiver<bool>,
}

impl ShutdownCoordinator {
    /// Create a coordinator that terminates the process on completion
    pub fn new(config: &ShutdownConfig, operation_tracker: Arc<OperationTracker>) -> Self {
        Self::with_exit_handler(config, operation_tracker, Arc::new(SystemExit))
    }

    /// Create a coordinator with an injected exit handler (used by tests)
    pub fn with_exit_handler(
        config: &ShutdownConfig,
        operation_tracker: Arc<OperationTracker>,
        exit_handler: Arc<dyn ProcessExit>,
    ) -> Self {
        let (done_tx, done_rx) = tokio::sync::watch::channel(false);
        Self {
            state: AtomicU8::new(ShutdownState::Idle as u8),
            accepting: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(Vec::new()),
            started_at: Mutex::new(None),
            operation_tracker,
            drain_timeout: config.drain_timeout,
            drain_poll_interval: config.drain_poll_interval,
            exit_handler,
            done_tx,
            done_rx,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether new work should still be admitted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Register a cleanup task. Re-registering a name replaces the previous
    /// definition. Registration is rejected once shutdown has started.
    pub fn register_task<F, Fut>(
        &self,
        name: &str,
        priority: i32,
        task_timeout: Option<Duration>,
        action: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_boxed_task(
            name,
            priority,
            task_timeout,
            Box::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(action()) }),
        )
    }

    fn register_boxed_task(
        &self,
        name: &str,
        priority: i32,
        task_timeout: Option<Duration>,
        action: TaskAction,
    ) -> Result<()> {
        if self.state() != ShutdownState::Idle {
            error!(
                "Rejected registration of shutdown task '{}': shutdown already in progress",
                name
            );
            return Err(ServiceError::ShutdownError(format!(
                "Cannot register task '{}' after shutdown has started",
                name
            )));
        }

        let task = ShutdownTask {
            name: name.to_string(),
            priority,
            timeout: task_timeout.unwrap_or(DEFAULT_TASK_TIMEOUT),
            action,
        };

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(existing) = tasks.iter_mut().find(|t| t.name == name) {
            warn!("Replacing previously registered shutdown task '{}'", name);
            *existing = task;
        } else {
            debug!(
                "Registered shutdown task '{}' (priority {}, timeout {:?})",
                name, priority, task.timeout
            );
            tasks.push(task);
        }

        Ok(())
    }

    /// Remove a task by name; false when no such task exists
    pub fn remove_task(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t.name != name);
        let removed = tasks.len() != before;
        if removed {
            debug!("Removed shutdown task '{}'", name);
        }
        removed
    }

    /// Install the built-in cleanup tasks wired to the provided components.
    ///
    /// Tasks whose component hook is absent are simply not installed; each
    /// remains individually replaceable or removable by name afterwards.
    pub fn install_default_tasks(&self, hooks: DefaultTaskHooks) -> Result<()> {
        let accepting = self.accepting.clone();
        self.register_task("stop-intake", 10, Some(Duration::from_secs(5)), move || {
            let accepting = accepting.clone();
            async move {
                accepting.store(false, Ordering::Release);
                info!("Stopped accepting new work");
                Ok(())
            }
        })?;

        let tracker = self.operation_tracker.clone();
        let drain_bound = self.drain_timeout;
        let poll_interval = self.drain_poll_interval;
        // The drain task's own timeout must outlast its internal poll bound
        let drain_task_timeout = drain_bound + Duration::from_secs(5);
        self.register_task(
            "drain-operations",
            20,
            Some(drain_task_timeout),
            move || {
                let tracker = tracker.clone();
                async move {
                    let deadline = Instant::now() + drain_bound;
                    loop {
                        let remaining = tracker.active_count();
                        if remaining == 0 {
                            info!("All in-flight operations drained");
                            return Ok(());
                        }
                        if Instant::now() >= deadline {
                            warn!(
                                "Drain bound {:?} reached with {} operations still active ({:?}), proceeding",
                                drain_bound,
                                remaining,
                                tracker.active_ids()
                            );
                            return Ok(());
                        }
                        info!("Waiting for {} in-flight operations to complete", remaining);
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            },
        )?;

        if let Some(release_locks) = hooks.release_locks {
            self.register_boxed_task("release-locks", 30, None, release_locks)?;
        }

        if let Some(teardown_listeners) = hooks.teardown_listeners {
            self.register_boxed_task("teardown-listeners", 40, None, teardown_listeners)?;
        }

        if hooks.cache_service.is_some() || !hooks.pool_closers.is_empty() {
            let cache_service = hooks.cache_service;
            let pool_closers = Arc::new(hooks.pool_closers);
            self.register_task(
                "close-connections",
                50,
                Some(Duration::from_secs(15)),
                move || {
                    let cache_service = cache_service.clone();
                    let pool_closers = pool_closers.clone();
                    async move {
                        let mut failures = 0usize;

                        if let Some(cache) = cache_service {
                            info!("Closing cache backend connection");
                            if let Err(e) = cache.disconnect().await {
                                warn!("Cache disconnect failed: {}", e);
                                failures += 1;
                            }
                        }

                        for (i, closer) in pool_closers.iter().enumerate() {
                            if let Err(e) = closer().await {
                                warn!("Connection pool closer {} failed: {}", i, e);
                                failures += 1;
                            }
                        }

                        if failures > 0 {
                            return Err(ServiceError::ShutdownError(format!(
                                "{} connection closers failed",
                                failures
                            )));
                        }
                        Ok(())
                    }
                },
            )?;
        }

        if let Some(logger) = hooks.logger {
            self.register_task("flush-logs", 60, Some(Duration::from_secs(5)), move || {
                let logger = logger.clone();
                async move {
                    logger.flush();
                    Ok(())
                }
            })?;
        }

        Ok(())
    }

    /// Begin (or join) the shutdown sequence.
    ///
    /// The first caller drives the sequence to completion; any concurrent
    /// caller awaits that same run, so cleanup tasks execute exactly once no
    /// matter how many termination signals arrive.
    pub async fn initiate(&self, trigger: &str, options: ShutdownOptions) {
        let claimed = self
            .state
            .compare_exchange(
                ShutdownState::Idle as u8,
                ShutdownState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !claimed {
            info!(
                "Shutdown already in progress, joining existing run (trigger: {})",
                trigger
            );
            let mut done = self.done_rx.clone();
            while !*done.borrow() {
                if done.changed().await.is_err() {
                    break;
                }
            }
            return;
        }

        let start = Instant::now();
        *self.started_at.lock().unwrap() = Some(Utc::now());
        let exit_code = if options.critical { 1 } else { 0 };

        warn!(
            "Graceful shutdown initiated (trigger: {}, graceful_timeout: {:?}, critical: {})",
            trigger, options.graceful_timeout, options.critical
        );

        // Backstop against a hung cleanup task: exits unconditionally
        let force_timer = if options.allow_force_exit {
            let exit_handler = self.exit_handler.clone();
            let force_timeout = options.force_timeout;
            Some(tokio::spawn(async move {
                tokio::time::sleep(force_timeout).await;
                error!(
                    "Force shutdown timeout ({:?}) reached, exiting immediately",
                    force_timeout
                );
                exit_handler.exit(exit_code);
            }))
        } else {
            None
        };

        match timeout(options.graceful_timeout, self.run_tasks()).await {
            Ok(()) => info!("Shutdown task sequence completed in {:?}", start.elapsed()),
            Err(_) => error!(
                "Graceful shutdown timed out after {:?}, proceeding to exit",
                options.graceful_timeout
            ),
        }

        if let Some(timer) = force_timer {
            timer.abort();
        }

        self.state
            .store(ShutdownState::Exited as u8, Ordering::Release);
        let _ = self.done_tx.send(true);

        info!(
            "Shutdown complete in {:?} (trigger: {}, exit code {})",
            start.elapsed(),
            trigger,
            exit_code
        );
        self.exit_handler.exit(exit_code);
    }

    /// Execute registered tasks in ascending priority order, sequentially.
    /// Later tasks may rely on earlier tasks' postconditions, so there is no
    /// concurrency here by design of the ordering contract.
    async fn run_tasks(&self) {
        self.state
            .store(ShutdownState::ExecutingTasks as u8, Ordering::Release);

        let mut order: Vec<(i32, String)> = {
            let tasks = self.tasks.lock().unwrap();
            tasks.iter().map(|t| (t.priority, t.name.clone())).collect()
        };
        // Stable sort keeps registration order within equal priorities
        order.sort_by_key(|(priority, _)| *priority);

        info!("Executing {} shutdown tasks", order.len());

        for (priority, name) in order {
            let prepared = {
                let tasks = self.tasks.lock().unwrap();
                tasks
                    .iter()
                    .find(|t| t.name == name)
                    .map(|t| ((t.action)(), t.timeout))
            };

            let (fut, task_timeout) = match prepared {
                Some(prepared) => prepared,
                // Removed mid-flight; nothing to run
                None => continue,
            };

            debug!("Running shutdown task '{}' (priority {})", name, priority);
            let task_start = Instant::now();

            match timeout(task_timeout, fut).await {
                Ok(Ok(())) => info!(
                    "Shutdown task '{}' completed in {:?}",
                    name,
                    task_start.elapsed()
                ),
                Ok(Err(e)) => warn!(
                    "Shutdown task '{}' failed after {:?}: {} (continuing)",
                    name,
                    task_start.elapsed(),
                    e
                ),
                Err(_) => warn!(
                    "Shutdown task '{}' timed out after {:?} (skipping)",
                    name, task_timeout
                ),
            }
        }
    }

    /// Status snapshot for dashboards and health probes
    pub fn get_status(&self) -> ShutdownStatus {
        let registered_tasks = {
            let tasks = self.tasks.lock().unwrap();
            let mut infos: Vec<TaskInfo> = tasks
                .iter()
                .map(|t| TaskInfo {
                    name: t.name.clone(),
                    priority: t.priority,
                    timeout_ms: t.timeout.as_millis() as u64,
                })
                .collect();
            infos.sort_by_key(|t| t.priority);
            infos
        };

        ShutdownStatus {
            state: self.state(),
            started_at: *self.started_at.lock().unwrap(),
            active_operation_ids: self.operation_tracker.active_ids(),
            registered_tasks,
        }
    }

    /// Listen for termination signals and initiate shutdown on the first one.
    /// This is the reference wiring used by the binary; embedders may drive
    /// `initiate` from their own signal handling instead.
    #[cfg(unix)]
    pub async fn listen_for_signals(&self, options: ShutdownOptions) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            ServiceError::InternalError(format!("Failed to create SIGINT handler: {}", e))
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            ServiceError::InternalError(format!("Failed to create SIGTERM handler: {}", e))
        })?;

        let trigger = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };

        info!("Received {}, initiating graceful shutdown", trigger);
        self.initiate(trigger, options).await;
        Ok(())
    }
}
