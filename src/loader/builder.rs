//! Loader builder with pluggable capabilities
//!
//! Everything a loader needs is decided here: the key-to-fetcher bindings,
//! the cache and preload tuning, and the environment capabilities (idle
//! signal, connection probe). [`LoaderBuilder::build`] validates the
//! configuration, assembles the core, and starts the background services,
//! returning a ready [`DeferredLoader`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cache::metrics::MetricsCollector;
use crate::error::{Error, Result};
use crate::schedule::{DelayScheduler, ManualProbe};
use crate::services::{
    PreloadConfig, PreloadService, ServiceConfig, ServiceManager, SweeperConfig, SweeperService,
};
use crate::types::ResourceKey;

use super::core::LoaderCore;
use super::handle::DeferredLoader;
use super::registry::FetcherRegistry;
use super::traits::{ConnectionProbe, FnFetcher, IdleScheduler, ResourceFetcher, SharedFetcher};

// ============================================================================
// Configuration
// ============================================================================

/// Loader configuration
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Identity used in logs, metrics and stats
    pub loader_id: String,
    /// Maximum age of a cached entry
    pub max_age: Duration,
    /// Maximum number of cached entries
    pub max_entries: usize,
    /// Interactions that trigger a preload
    pub preload_threshold: u32,
    /// Longest a preload may wait for an idle window
    pub idle_timeout: Duration,
    /// Fixed delay used when no idle signal is injected
    pub fallback_delay: Duration,
    /// Time between expiry sweeps
    pub sweep_interval: Duration,
    /// Capacity of the preload request queue
    pub preload_queue_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            loader_id: format!("loader-{}", Uuid::new_v4()),
            max_age: Duration::from_secs(300), // 5 minutes
            max_entries: 10,
            preload_threshold: 2,
            idle_timeout: Duration::from_secs(2),
            fallback_delay: Duration::from_millis(200),
            sweep_interval: Duration::from_secs(60), // 1 minute
            preload_queue_depth: 32,
        }
    }
}

impl LoaderConfig {
    /// Check the configuration for values the loader cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.loader_id.is_empty() {
            return Err(Error::Configuration(
                "loader_id must not be empty".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(Error::Configuration(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if self.max_age.is_zero() {
            return Err(Error::Configuration(
                "max_age must be greater than zero".to_string(),
            ));
        }
        if self.preload_threshold == 0 {
            return Err(Error::Configuration(
                "preload_threshold must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Configuration(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.preload_queue_depth == 0 {
            return Err(Error::Configuration(
                "preload_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert to sweeper config
    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            sweep_interval: self.sweep_interval,
        }
    }

    /// Convert to preload config
    pub fn preload_config(&self) -> PreloadConfig {
        PreloadConfig {
            idle_timeout: self.idle_timeout,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for configuring a loader with custom capabilities
pub struct LoaderBuilder<V> {
    config: LoaderConfig,
    service_config: ServiceConfig,
    fetchers: HashMap<ResourceKey, SharedFetcher<V>>,
    scheduler: Option<Arc<dyn IdleScheduler>>,
    probe: Option<Arc<dyn ConnectionProbe>>,
}

impl<V: Send + Sync + 'static> LoaderBuilder<V> {
    /// Create a new loader builder
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
            service_config: ServiceConfig::default(),
            fetchers: HashMap::new(),
            scheduler: None,
            probe: None,
        }
    }

    /// Set the full loader configuration
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the service manager configuration
    pub fn with_service_config(mut self, config: ServiceConfig) -> Self {
        self.service_config = config;
        self
    }

    /// Set the loader identity used in logs and metrics
    pub fn loader_id(mut self, id: impl Into<String>) -> Self {
        self.config.loader_id = id.into();
        self
    }

    /// Set the maximum age of a cached entry
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.max_age = max_age;
        self
    }

    /// Set the maximum number of cached entries
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.config.max_entries = max_entries;
        self
    }

    /// Set how many interactions trigger a preload
    pub fn preload_threshold(mut self, threshold: u32) -> Self {
        self.config.preload_threshold = threshold;
        self
    }

    /// Set the longest a preload may wait for an idle window
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the fixed delay used when no idle signal is injected
    pub fn fallback_delay(mut self, delay: Duration) -> Self {
        self.config.fallback_delay = delay;
        self
    }

    /// Set the time between expiry sweeps
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the capacity of the preload request queue
    pub fn preload_queue_depth(mut self, depth: usize) -> Self {
        self.config.preload_queue_depth = depth;
        self
    }

    /// Register a fetcher for a key
    ///
    /// Registering the same key again replaces the earlier binding. Keys
    /// must be non-empty; [`build`](Self::build) rejects empty ones.
    pub fn register<F>(mut self, key: impl Into<ResourceKey>, fetcher: F) -> Self
    where
        F: ResourceFetcher<V> + 'static,
    {
        let key = key.into();
        if self.fetchers.insert(key.clone(), Arc::new(fetcher)).is_some() {
            tracing::debug!(key = %key, "Fetcher replaced");
        }
        self
    }

    /// Register an async closure as the fetcher for a key
    pub fn register_fn<F, Fut>(self, key: impl Into<ResourceKey>, fetch: F) -> Self
    where
        F: Fn(ResourceKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.register(key, FnFetcher::new(fetch))
    }

    /// Set a custom idle scheduler implementation
    pub fn with_scheduler<S>(mut self, scheduler: S) -> Self
    where
        S: IdleScheduler + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Set a custom connection probe implementation
    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: ConnectionProbe + 'static,
    {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// Build the loader and start its background services
    ///
    /// Capabilities that were not injected fall back to the crate's own
    /// implementations: a fixed-delay idle scheduler and a probe that
    /// reports an unreadable connection.
    pub async fn build(self) -> Result<DeferredLoader<V>> {
        self.config.validate()?;
        if self.fetchers.keys().any(|key| key.is_empty()) {
            return Err(Error::Configuration(
                "registered resource keys must not be empty".to_string(),
            ));
        }

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(DelayScheduler::new(self.config.fallback_delay)));
        let probe = self.probe.unwrap_or_else(|| Arc::new(ManualProbe::unknown()));

        let metrics = Arc::new(MetricsCollector::new(self.config.loader_id.clone()));
        let (preload_tx, preload_rx) = mpsc::channel(self.config.preload_queue_depth);

        let registry = FetcherRegistry::new(self.fetchers);
        tracing::debug!(
            loader_id = %self.config.loader_id,
            registered_keys = registry.len(),
            "Building loader"
        );

        let core = LoaderCore::new(self.config.clone(), registry, metrics, preload_tx);

        let services = Arc::new(ServiceManager::new(self.service_config));
        services.register(Arc::new(SweeperService::new(
            self.config.sweeper_config(),
            core.clone(),
        )));
        services.register(Arc::new(PreloadService::new(
            self.config.preload_config(),
            core.clone(),
            Arc::clone(&scheduler),
            Arc::clone(&probe),
            preload_rx,
        )));
        services
            .start_all()
            .await
            .map_err(|e| Error::Service(e.to_string()))?;

        Ok(DeferredLoader::assemble(core, scheduler, services))
    }
}

impl<V: Send + Sync + 'static> Default for LoaderBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ImmediateScheduler;
    use crate::types::ConnectionQuality;

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.loader_id.starts_with("loader-"));
        assert_eq!(config.max_age, Duration::from_secs(300));
        assert_eq!(config.max_entries, 10);
        assert_eq!(config.preload_threshold, 2);
        assert_eq!(config.idle_timeout, Duration::from_secs(2));
        assert_eq!(config.fallback_delay, Duration::from_millis(200));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.preload_queue_depth, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let config = LoaderConfig {
            max_entries: 0,
            ..LoaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = LoaderConfig {
            preload_threshold: 0,
            ..LoaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = LoaderConfig {
            loader_id: String::new(),
            ..LoaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = LoaderConfig {
            max_age: Duration::ZERO,
            ..LoaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_builder_creation() {
        let builder: LoaderBuilder<u32> = LoaderBuilder::new();
        assert!(builder.scheduler.is_none());
        assert!(builder.probe.is_none());
        assert!(builder.fetchers.is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let result = LoaderBuilder::<u32>::new()
            .max_entries(0)
            .register_fn("a", |_| async { Ok(1) })
            .build()
            .await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_empty_key() {
        let result = LoaderBuilder::<u32>::new()
            .register_fn("", |_| async { Ok(1) })
            .build()
            .await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_starts_services() {
        let loader = LoaderBuilder::<u32>::new()
            .loader_id("builder-test")
            .register_fn("profile", |_| async { Ok(7) })
            .build()
            .await
            .unwrap();

        // Service tasks need a yield before they report running
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(loader.services_healthy());
        assert_eq!(*loader.acquire("profile").await.unwrap(), 7);

        loader.shutdown_gracefully().await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_probe_updates_after_build() {
        let probe = Arc::new(ManualProbe::slow());
        let loader = LoaderBuilder::<u32>::new()
            .loader_id("probe-test")
            .with_scheduler(ImmediateScheduler)
            .with_probe(Arc::clone(&probe))
            .register_fn("profile", |_| async { Ok(1) })
            .build()
            .await
            .unwrap();

        loader.track_interaction("profile").unwrap();
        loader.track_interaction("profile").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!loader.contains("profile"));

        // The host-side handle still controls the reading
        probe.set(ConnectionQuality::Fast);
        loader.track_interaction("profile").unwrap();
        loader.track_interaction("profile").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(loader.contains("profile"));

        loader.shutdown_gracefully().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_replaces_earlier_binding() {
        let loader = LoaderBuilder::<u32>::new()
            .loader_id("rebind-test")
            .register_fn("profile", |_| async { Ok(1) })
            .register_fn("profile", |_| async { Ok(2) })
            .build()
            .await
            .unwrap();

        assert_eq!(*loader.acquire("profile").await.unwrap(), 2);
        loader.shutdown_gracefully().await.unwrap();
    }
}
