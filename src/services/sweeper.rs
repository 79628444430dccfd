//! Sweeper Service
//!
//! Runs the cache's expiry sweep on a fixed interval so entries that are
//! never re-read still get reclaimed. Lazy expiry at lookup time handles
//! hot keys; the sweeper handles the cold ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::loader::LoaderCore;

use super::framework::{RestartPolicy, Service, ServiceError, ServiceStatus};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the sweeper service
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweep cycles
    pub sweep_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60), // 1 minute
        }
    }
}

// ============================================================================
// Sweeper Service
// ============================================================================

/// Background service that expires cache entries on an interval
pub struct SweeperService<V> {
    /// Configuration
    config: SweeperConfig,

    /// The loader whose cache gets swept
    core: LoaderCore<V>,

    /// Current service status
    status: RwLock<ServiceStatus>,

    /// Completed cycle counter
    cycles: AtomicU64,
}

impl<V: Send + Sync + 'static> SweeperService<V> {
    /// Create a new sweeper for a loader
    pub fn new(config: SweeperConfig, core: LoaderCore<V>) -> Self {
        Self {
            config,
            core,
            status: RwLock::new(ServiceStatus::Stopped),
            cycles: AtomicU64::new(0),
        }
    }

    /// Create with default configuration
    pub fn with_core(core: LoaderCore<V>) -> Self {
        Self::new(SweeperConfig::default(), core)
    }

    /// Number of sweep cycles completed
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl<V: Send + Sync + 'static> Service for SweeperService<V> {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Running;
        tracing::debug!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Sweeper service started"
        );

        let mut sweep_interval = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                // Shutdown signal received
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Sweeper service received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Missed some messages but channel is still open, continue
                            tracing::debug!(missed = n, "Sweeper broadcast receiver lagged");
                        }
                    }
                }

                // Periodic expiry sweep
                _ = sweep_interval.tick() => {
                    let removed = self.core.sweep();
                    self.cycles.fetch_add(1, Ordering::Relaxed);
                    if removed > 0 {
                        tracing::debug!(removed, "Sweep cycle reclaimed entries");
                    }
                }
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::debug!("Sweeper service stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sweeper"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::OnFailure {
            max_retries: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
