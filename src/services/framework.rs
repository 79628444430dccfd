//! Background Service Framework
//!
//! Common lifecycle machinery for the loader's background services. A
//! service is a long-running task that ticks until a shutdown signal
//! arrives; the manager owns the shutdown channel, spawns each service
//! with its restart policy, and joins them on shutdown.
//!
//! Shutdown is broadcast: every running service holds a receiver and
//! exits its loop when the signal lands. A service that exits cleanly is
//! never restarted; a service that fails is restarted according to its
//! [`RestartPolicy`] unless shutdown has begun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by background services and their manager
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// Service execution failed
    #[error("Service execution failed: {0}")]
    ExecutionFailed(String),

    /// The manager was started twice
    #[error("Service manager is already running")]
    AlreadyRunning,

    /// A service names a dependency that was never registered
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    MissingDependency {
        /// The service declaring the dependency
        service: String,
        /// The missing dependency
        dependency: String,
    },

    /// Shutdown did not complete in time
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

// ============================================================================
// Status and policies
// ============================================================================

/// Lifecycle status of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not yet started, or cleanly stopped
    Stopped,
    /// Running its main loop
    Running,
    /// Exited with an error
    Failed(String),
}

impl ServiceStatus {
    /// True if the service is running normally
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }
}

/// How the manager reacts when a service's task ends in an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Leave the service down
    Never,
    /// Restart up to `max_retries` times, waiting `backoff` between
    /// attempts
    OnFailure {
        /// Restart attempts before giving up
        max_retries: u32,
        /// Pause between attempts
        backoff: Duration,
    },
    /// Restart after every failure, waiting `backoff` between attempts
    Always {
        /// Pause between attempts
        backoff: Duration,
    },
}

// ============================================================================
// Service trait
// ============================================================================

/// A long-running background task managed by the [`ServiceManager`]
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Run the service until a shutdown signal arrives
    ///
    /// Returning `Ok` means a clean exit; the manager will not restart
    /// the service. Returning `Err` engages the restart policy.
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError>;

    /// Stable name used in logs and status reports
    fn name(&self) -> &'static str;

    /// Current lifecycle status
    fn status(&self) -> ServiceStatus;

    /// Names of services that must be registered before this one starts
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// How the manager reacts when the service fails
    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::OnFailure {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Configuration for the service manager
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Capacity of the shutdown broadcast channel
    pub shutdown_channel_capacity: usize,

    /// How long shutdown waits for each service before aborting it
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shutdown_channel_capacity: 16,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared handle to a service manager
pub type SharedServiceManager = Arc<ServiceManager>;

/// Coordinates lifecycle of registered background services
///
/// Services start in registration order, each on its own tokio task
/// wrapped with its restart policy. Shutdown broadcasts once, then joins
/// every task within the configured timeout.
pub struct ServiceManager {
    config: ServiceConfig,
    services: RwLock<Vec<Arc<dyn Service>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
    running: AtomicBool,
}

impl ServiceManager {
    /// Create a manager with the given configuration
    pub fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(config.shutdown_channel_capacity);
        Self {
            config,
            services: RwLock::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            shutdown_tx,
            shutting_down: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    /// Create a manager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ServiceConfig::default())
    }

    /// Register a service; takes effect at the next `start_all`
    pub fn register(&self, service: Arc<dyn Service>) {
        self.services.write().push(service);
    }

    /// Number of registered services
    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Start every registered service
    ///
    /// Dependencies are validated against the registered set before
    /// anything is spawned; callers are responsible for registering
    /// dependencies before their dependents.
    pub async fn start_all(&self) -> Result<(), ServiceError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }

        let services: Vec<Arc<dyn Service>> = self.services.read().clone();
        let registered: Vec<&'static str> = services.iter().map(|s| s.name()).collect();

        for service in &services {
            for dependency in service.dependencies() {
                if !registered.contains(&dependency) {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(ServiceError::MissingDependency {
                        service: service.name().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        let mut handles = self.handles.lock();
        for service in services {
            tracing::debug!(service = service.name(), "Starting service");
            let shutdown_tx = self.shutdown_tx.clone();
            let shutting_down = Arc::clone(&self.shutting_down);
            handles.push(tokio::spawn(run_with_policy(
                service,
                shutdown_tx,
                shutting_down,
            )));
        }

        Ok(())
    }

    /// Broadcast shutdown and join every service task
    ///
    /// A task that outlives the shutdown timeout is aborted; the timeout
    /// is then reported after all remaining tasks have been joined.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        // No receivers just means nothing was started
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let mut timed_out = false;

        for mut handle in handles {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Service task ended abnormally during shutdown");
                }
                Err(_) => {
                    tracing::error!(
                        timeout_secs = self.config.shutdown_timeout.as_secs(),
                        "Service did not stop in time; aborting"
                    );
                    handle.abort();
                    timed_out = true;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);

        if timed_out {
            Err(ServiceError::ShutdownTimeout(self.config.shutdown_timeout))
        } else {
            Ok(())
        }
    }

    /// True if every registered service reports a healthy status
    pub fn is_healthy(&self) -> bool {
        self.services
            .read()
            .iter()
            .all(|service| service.status().is_healthy())
    }

    /// Name and status of every registered service
    pub fn status(&self) -> Vec<(&'static str, ServiceStatus)> {
        self.services
            .read()
            .iter()
            .map(|service| (service.name(), service.status()))
            .collect()
    }
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("services", &self.status())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

/// Run one service, restarting per its policy until shutdown begins
async fn run_with_policy(
    service: Arc<dyn Service>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: Arc<AtomicBool>,
) {
    let policy = service.restart_policy();
    let mut attempts: u32 = 0;

    loop {
        let shutdown_rx = shutdown_tx.subscribe();
        match service.start(shutdown_rx).await {
            Ok(()) => {
                tracing::debug!(service = service.name(), "Service exited cleanly");
                break;
            }
            Err(e) => {
                tracing::error!(service = service.name(), error = %e, "Service failed");
                if shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                let backoff = match policy {
                    RestartPolicy::Never => break,
                    RestartPolicy::OnFailure {
                        max_retries,
                        backoff,
                    } => {
                        attempts += 1;
                        if attempts > max_retries {
                            tracing::error!(
                                service = service.name(),
                                attempts,
                                "Restart limit reached; leaving service down"
                            );
                            break;
                        }
                        backoff
                    }
                    RestartPolicy::Always { backoff } => backoff,
                };
                tokio::time::sleep(backoff).await;
                if shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                tracing::debug!(service = service.name(), attempt = attempts, "Restarting service");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct TickingService {
        status: RwLock<ServiceStatus>,
        ticks: AtomicU32,
    }

    impl TickingService {
        fn new() -> Self {
            Self {
                status: RwLock::new(ServiceStatus::Stopped),
                ticks: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Service for TickingService {
        async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            *self.status.write() = ServiceStatus::Running;
            let mut tick = tokio::time::interval(Duration::from_millis(10));
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tick.tick() => {
                        self.ticks.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            *self.status.write() = ServiceStatus::Stopped;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "ticker"
        }

        fn status(&self) -> ServiceStatus {
            self.status.read().clone()
        }
    }

    struct FlakyService {
        failures_left: AtomicU32,
        starts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Service for FlakyService {
        async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            self.starts.fetch_add(1, Ordering::Relaxed);
            if self.failures_left.load(Ordering::Relaxed) > 0 {
                self.failures_left.fetch_sub(1, Ordering::Relaxed);
                return Err(ServiceError::ExecutionFailed("induced".to_string()));
            }
            let _ = shutdown.recv().await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flaky"
        }

        fn status(&self) -> ServiceStatus {
            ServiceStatus::Running
        }

        fn restart_policy(&self) -> RestartPolicy {
            RestartPolicy::OnFailure {
                max_retries: 5,
                backoff: Duration::from_millis(10),
            }
        }
    }

    #[test]
    fn test_status_health() {
        assert!(ServiceStatus::Running.is_healthy());
        assert!(!ServiceStatus::Stopped.is_healthy());
        assert!(!ServiceStatus::Failed("boom".to_string()).is_healthy());
    }

    #[tokio::test]
    async fn test_manager_lifecycle() {
        let manager = ServiceManager::with_defaults();
        let service = Arc::new(TickingService::new());
        manager.register(service.clone());

        manager.start_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(manager.is_healthy());
        assert!(service.ticks.load(Ordering::Relaxed) > 0);

        manager.shutdown().await.unwrap();
        assert!(matches!(service.status(), ServiceStatus::Stopped));
    }

    #[tokio::test]
    async fn test_start_all_twice_fails() {
        let manager = ServiceManager::with_defaults();
        manager.start_all().await.unwrap();
        assert!(matches!(
            manager.start_all().await,
            Err(ServiceError::AlreadyRunning)
        ));
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_dependency_rejected() {
        struct Dependent;

        #[async_trait::async_trait]
        impl Service for Dependent {
            async fn start(
                &self,
                mut shutdown: broadcast::Receiver<()>,
            ) -> Result<(), ServiceError> {
                let _ = shutdown.recv().await;
                Ok(())
            }

            fn name(&self) -> &'static str {
                "dependent"
            }

            fn status(&self) -> ServiceStatus {
                ServiceStatus::Stopped
            }

            fn dependencies(&self) -> Vec<&'static str> {
                vec!["missing"]
            }
        }

        let manager = ServiceManager::with_defaults();
        manager.register(Arc::new(Dependent));

        match manager.start_all().await {
            Err(ServiceError::MissingDependency {
                service,
                dependency,
            }) => {
                assert_eq!(service, "dependent");
                assert_eq!(dependency, "missing");
            }
            other => panic!("expected missing dependency error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_service_restarts() {
        let manager = ServiceManager::with_defaults();
        let service = Arc::new(FlakyService {
            failures_left: AtomicU32::new(2),
            starts: AtomicU32::new(0),
        });
        manager.register(service.clone());

        manager.start_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Two failures plus the run that sticks
        assert_eq!(service.starts.load(Ordering::Relaxed), 3);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_reports_all_services() {
        let manager = ServiceManager::with_defaults();
        manager.register(Arc::new(TickingService::new()));

        let statuses = manager.status();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, "ticker");
        assert_eq!(statuses[0].1, ServiceStatus::Stopped);
        assert_eq!(manager.service_count(), 1);
    }
}
