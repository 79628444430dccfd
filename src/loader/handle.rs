//! Public loader handle
//!
//! [`DeferredLoader`] is the face of the crate: one value that owns the
//! loader core, the injected capabilities and the background services.
//! Handles are cheap to clone and all clones share the same state, so one
//! loader can serve every part of an application.
//!
//! Background services keep running until [`shutdown_gracefully`] is
//! called; dropping the last handle does not stop them.
//!
//! [`shutdown_gracefully`]: DeferredLoader::shutdown_gracefully

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::metrics::{LoaderReport, MetricsCollector};
use crate::cache::EntryInfo;
use crate::error::{Error, Result};
use crate::predictor::PredictorSignal;
use crate::schedule::{spawn_deferred, ScheduleOptions};
use crate::services::{ServiceStatus, SharedServiceManager};
use crate::types::ResourceKey;

use super::builder::LoaderConfig;
use super::core::{LoaderCore, LoaderStats};
use super::traits::{IdleScheduler, SharedFetcher};

/// Handle to a running deferred resource loader
pub struct DeferredLoader<V> {
    core: LoaderCore<V>,
    scheduler: Arc<dyn IdleScheduler>,
    services: SharedServiceManager,
}

impl<V> Clone for DeferredLoader<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            scheduler: Arc::clone(&self.scheduler),
            services: Arc::clone(&self.services),
        }
    }
}

impl<V> std::fmt::Debug for DeferredLoader<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredLoader")
            .field("core", &self.core)
            .field("services", &self.services.status())
            .finish()
    }
}

impl<V: Send + Sync + 'static> DeferredLoader<V> {
    /// Wire a built core to its capabilities and running services
    pub(crate) fn assemble(
        core: LoaderCore<V>,
        scheduler: Arc<dyn IdleScheduler>,
        services: SharedServiceManager,
    ) -> Self {
        Self {
            core,
            scheduler,
            services,
        }
    }

    // ===== Resource access =====

    /// Resolve a resource through the cache, loading on a miss
    ///
    /// Concurrent calls for the same key share one load; the result is
    /// cached for subsequent calls until it expires or is evicted.
    pub async fn acquire(&self, key: impl Into<ResourceKey>) -> Result<Arc<V>> {
        self.core.acquire(&key.into()).await
    }

    /// Resolve a resource using a caller-supplied fetcher
    ///
    /// Useful for keys that are not worth a permanent registration; the
    /// result is cached and deduplicated exactly like a registered key.
    pub async fn acquire_with(
        &self,
        key: impl Into<ResourceKey>,
        fetcher: SharedFetcher<V>,
    ) -> Result<Arc<V>> {
        self.core.acquire_with(&key.into(), fetcher).await
    }

    /// Peek at the cache without triggering a load
    pub fn get(&self, key: impl Into<ResourceKey>) -> Option<Arc<V>> {
        self.core.get(&key.into())
    }

    /// Invalidate a key and load it again
    pub async fn refresh(&self, key: impl Into<ResourceKey>) -> Result<Arc<V>> {
        self.core.refresh(&key.into()).await
    }

    // ===== Cache control =====

    /// Drop one cached entry, returning whether it existed
    pub fn invalidate(&self, key: impl Into<ResourceKey>) -> bool {
        self.core.invalidate(&key.into())
    }

    /// Drop every cached entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        self.core.clear()
    }

    /// Remove expired entries now, returning how many were dropped
    ///
    /// The sweeper service does this on an interval; manual sweeps are
    /// for callers that want expiry enforced at a specific moment.
    pub fn sweep(&self) -> usize {
        self.core.sweep()
    }

    // ===== Prediction =====

    /// Record one user interaction with a key
    ///
    /// Enough interactions queue a background preload for the key, so it
    /// is already warm when the user finally navigates to it.
    pub fn track_interaction(&self, key: impl Into<ResourceKey>) -> Result<PredictorSignal> {
        self.core.track_interaction(&key.into())
    }

    // ===== Deferred work =====

    /// Run a task after an idle window
    ///
    /// Uses the loader's idle scheduler; high-priority options skip the
    /// wait. Returns the task's join handle.
    pub fn schedule<F, Fut, T>(&self, options: ScheduleOptions, task: F) -> JoinHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        spawn_deferred(Arc::clone(&self.scheduler), options, task)
    }

    // ===== Introspection =====

    /// True if a fresh entry exists for the key
    pub fn contains(&self, key: impl Into<ResourceKey>) -> bool {
        self.core.contains(&key.into())
    }

    /// True if a load is in flight for the key
    pub fn is_pending(&self, key: impl Into<ResourceKey>) -> bool {
        self.core.is_pending(&key.into())
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// True if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Metadata for one cached entry
    pub fn entry_info(&self, key: impl Into<ResourceKey>) -> Option<EntryInfo> {
        self.core.entry_info(&key.into())
    }

    /// Keys currently cached, in no particular order
    pub fn cached_keys(&self) -> Vec<ResourceKey> {
        self.core.cached_keys()
    }

    /// Keys with a registered fetcher, in sorted order
    pub fn registered_keys(&self) -> Vec<ResourceKey> {
        self.core.registry().keys()
    }

    /// The configuration the loader was built with
    pub fn config(&self) -> &LoaderConfig {
        self.core.config()
    }

    /// Point-in-time stats for the loader
    pub fn stats(&self) -> LoaderStats {
        self.core.stats()
    }

    /// The loader's metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.core.metrics()
    }

    /// Full metrics report including uptime
    pub fn report(&self) -> LoaderReport {
        self.core.metrics().report()
    }

    // ===== Services =====

    /// Name and status of every background service
    pub fn service_status(&self) -> Vec<(&'static str, ServiceStatus)> {
        self.services.status()
    }

    /// True if every background service is running normally
    pub fn services_healthy(&self) -> bool {
        self.services.is_healthy()
    }

    /// Stop the background services and wait for them to finish
    ///
    /// In-flight load episodes are not interrupted; they settle into the
    /// cache on their own tasks.
    pub async fn shutdown_gracefully(&self) -> Result<()> {
        tracing::debug!(loader_id = %self.core.config().loader_id, "Shutting down loader");
        self.services
            .shutdown()
            .await
            .map_err(|e| Error::Shutdown(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
