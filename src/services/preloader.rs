//! Preload Service
//!
//! Consumes the preload requests queued by interaction tracking and warms
//! the cache in the background. Each request waits for an idle window,
//! then re-checks the world before spending bandwidth: a constrained
//! connection skips the load, and a key that became warm in the meantime
//! needs nothing at all.
//!
//! Preloads ride the loader's normal acquire path, so they deduplicate
//! against caller-initiated loads and populate the cache under the same
//! invariants. A failed preload is logged and forgotten; the next real
//! request retries on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};

use crate::loader::traits::{ConnectionProbe, IdleScheduler};
use crate::loader::LoaderCore;
use crate::types::PreloadRequest;

use super::framework::{RestartPolicy, Service, ServiceError, ServiceStatus};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the preload service
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    /// Longest a request may wait for an idle window
    pub idle_timeout: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// Preload Service
// ============================================================================

/// Background service that warms the cache from queued preload requests
pub struct PreloadService<V> {
    /// Configuration
    config: PreloadConfig,

    /// The loader whose cache gets warmed
    core: LoaderCore<V>,

    /// Idle signal the service waits on before each preload
    scheduler: Arc<dyn IdleScheduler>,

    /// Connection quality read at each decision
    probe: Arc<dyn ConnectionProbe>,

    /// Queue of fired preload requests
    queue: AsyncMutex<mpsc::Receiver<PreloadRequest>>,

    /// Current service status
    status: RwLock<ServiceStatus>,

    /// Preloads that completed and populated the cache
    served: AtomicU64,
}

impl<V: Send + Sync + 'static> PreloadService<V> {
    /// Create a new preload service
    pub fn new(
        config: PreloadConfig,
        core: LoaderCore<V>,
        scheduler: Arc<dyn IdleScheduler>,
        probe: Arc<dyn ConnectionProbe>,
        queue: mpsc::Receiver<PreloadRequest>,
    ) -> Self {
        Self {
            config,
            core,
            scheduler,
            probe,
            queue: AsyncMutex::new(queue),
            status: RwLock::new(ServiceStatus::Stopped),
            served: AtomicU64::new(0),
        }
    }

    /// Number of preloads that completed
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Handle one fired request
    async fn serve(&self, request: PreloadRequest) {
        let key = request.key.clone();

        // Wait for a quiet moment before spending bandwidth
        self.scheduler.wait_for_idle(self.config.idle_timeout).await;

        // Quality is read after the wait so the decision reflects now
        let quality = self.probe.quality();
        if quality.is_constrained() {
            self.core
                .metrics()
                .metrics()
                .record_preload_skipped_network();
            tracing::debug!(key = %key, %quality, "Preload skipped; connection constrained");
            return;
        }

        // The key may have been loaded while the request sat in the queue
        if self.core.contains(&key) {
            tracing::trace!(key = %key, "Preload unnecessary; key already cached");
            return;
        }

        match self.core.acquire(&key).await {
            Ok(_) => {
                self.served.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    key = %key,
                    queued_ms = request.queued_for().as_millis() as u64,
                    "Preload completed"
                );
            }
            Err(e) => {
                // Speculative work; the next real request retries on its own
                tracing::debug!(key = %key, error = %e, "Preload failed");
            }
        }
    }
}

#[async_trait::async_trait]
impl<V: Send + Sync + 'static> Service for PreloadService<V> {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Running;
        tracing::debug!(
            idle_timeout_ms = self.config.idle_timeout.as_millis() as u64,
            "Preload service started"
        );

        let mut queue = self.queue.lock().await;

        loop {
            tokio::select! {
                // Shutdown signal received
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Preload service received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Missed some messages but channel is still open, continue
                            tracing::debug!(missed = n, "Preload broadcast receiver lagged");
                        }
                    }
                }

                // Next queued preload request
                request = queue.recv() => {
                    match request {
                        Some(request) => self.serve(request).await,
                        None => {
                            tracing::debug!("Preload queue closed");
                            break;
                        }
                    }
                }
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::debug!("Preload service stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "preloader"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::OnFailure {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metrics::MetricsCollector;
    use crate::loader::builder::LoaderConfig;
    use crate::loader::registry::FetcherRegistry;
    use crate::loader::traits::{FnFetcher, SharedFetcher};
    use crate::schedule::{ImmediateScheduler, ManualProbe};
    use crate::types::{ConnectionQuality, ResourceKey};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::new(s)
    }

    struct Fixture {
        core: LoaderCore<u32>,
        service: Arc<PreloadService<u32>>,
        probe: Arc<ManualProbe>,
        calls: Arc<AtomicU32>,
    }

    fn fixture() -> Fixture {
        let config = LoaderConfig {
            loader_id: "preload-test".to_string(),
            ..LoaderConfig::default()
        };

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_fetcher = calls.clone();
        let mut table: HashMap<ResourceKey, SharedFetcher<u32>> = HashMap::new();
        table.insert(
            key("workout"),
            Arc::new(FnFetcher::new(move |_| {
                let calls = Arc::clone(&calls_in_fetcher);
                async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
            })),
        );
        let registry = FetcherRegistry::new(table);
        let metrics = Arc::new(MetricsCollector::new(config.loader_id.clone()));
        let (preload_tx, preload_rx) = mpsc::channel(config.preload_queue_depth);
        let core = LoaderCore::new(config, registry, metrics, preload_tx);

        let probe = Arc::new(ManualProbe::fast());
        let service = Arc::new(PreloadService::new(
            PreloadConfig::default(),
            core.clone(),
            Arc::new(ImmediateScheduler),
            probe.clone() as Arc<dyn ConnectionProbe>,
            preload_rx,
        ));

        Fixture {
            core,
            service,
            probe,
            calls,
        }
    }

    #[tokio::test]
    async fn test_preload_service_lifecycle() {
        let fx = fixture();
        let (tx, rx) = broadcast::channel(1);

        let s = fx.service.clone();
        let handle = tokio::spawn(async move { s.start(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(fx.service.status(), ServiceStatus::Running));

        tx.send(()).unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(matches!(fx.service.status(), ServiceStatus::Stopped));
    }

    #[tokio::test]
    async fn test_interactions_warm_cache_in_background() {
        let fx = fixture();
        let (tx, rx) = broadcast::channel(1);
        let s = fx.service.clone();
        let handle = tokio::spawn(async move { s.start(rx).await });

        // Two interactions cross the default threshold
        fx.core.track_interaction(&key("workout")).unwrap();
        fx.core.track_interaction(&key("workout")).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Warm without any caller ever acquiring
        assert!(fx.core.contains(&key("workout")));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.service.served(), 1);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_constrained_connection_skips_preload() {
        let fx = fixture();
        fx.probe.set(ConnectionQuality::Slow);

        let (tx, rx) = broadcast::channel(1);
        let s = fx.service.clone();
        let handle = tokio::spawn(async move { s.start(rx).await });

        fx.core.track_interaction(&key("workout")).unwrap();
        fx.core.track_interaction(&key("workout")).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Nothing was fetched while the connection was constrained
        assert!(!fx.core.contains(&key("workout")));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            fx.core.stats().counters.preloads_skipped_network,
            1
        );

        // Quality recovered; the next fired request goes through
        fx.probe.set(ConnectionQuality::Fast);
        fx.core.track_interaction(&key("workout")).unwrap();
        fx.core.track_interaction(&key("workout")).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fx.core.contains(&key("workout")));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_preload_skipped_when_already_cached() {
        let fx = fixture();

        // Warm the key through the normal path first
        fx.core.acquire(&key("workout")).await.unwrap();
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

        let (tx, rx) = broadcast::channel(1);
        let s = fx.service.clone();
        let handle = tokio::spawn(async move { s.start(rx).await });

        // Fired requests for a warm key are filtered before the queue,
        // so nothing reaches the fetcher
        fx.core.track_interaction(&key("workout")).unwrap();
        fx.core.track_interaction(&key("workout")).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.service.served(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
