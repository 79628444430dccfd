//! Loader core: cache, load deduplication and interaction tracking
//!
//! All loader state lives behind one mutex: the TTL cache and the table of
//! in-flight loads. Keeping both under the same lock makes the check-then-act
//! sequences atomic, so a key is always in exactly one of three states:
//! cached, pending, or absent.
//!
//! A miss starts one load episode. The episode runs on its own task, so it
//! completes and populates the cache even if every caller that wanted it has
//! moved on. Callers that arrive while the episode is in flight subscribe to
//! its broadcast channel and share the single result, success or failure.
//! A failed episode caches nothing; the next request starts over. A fetcher
//! that panics settles its episode as interrupted, never as stuck.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::cache::metrics::{LoadTimer, MetricsCollector};
use crate::cache::{CacheConfig, EntryInfo, Lookup, LoaderMetricsSnapshot, TtlCache};
use crate::error::{Error, Result};
use crate::predictor::{InteractionPredictor, PredictorSignal};
use crate::types::{PreloadRequest, ResourceKey};

use super::builder::LoaderConfig;
use super::registry::FetcherRegistry;
use super::traits::SharedFetcher;

/// Result fanned out to every waiter of one load episode
type LoadOutcome<V> = std::result::Result<Arc<V>, Error>;

/// Cache and pending table, guarded together
struct CoreState<V> {
    cache: TtlCache<V>,
    pending: HashMap<ResourceKey, broadcast::Sender<LoadOutcome<V>>>,
}

struct CoreInner<V> {
    config: LoaderConfig,
    registry: FetcherRegistry<V>,
    state: Mutex<CoreState<V>>,
    predictor: InteractionPredictor,
    metrics: Arc<MetricsCollector>,
    preload_tx: mpsc::Sender<PreloadRequest>,
}

/// Deduplicating, caching loader state machine
///
/// Cheap to clone; all clones share the same cache, pending table and
/// counters. The public handle and the background services each hold one.
pub struct LoaderCore<V> {
    inner: Arc<CoreInner<V>>,
}

impl<V> Clone for LoaderCore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for LoaderCore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderCore")
            .field("loader_id", &self.inner.config.loader_id)
            .field("registered_keys", &self.inner.registry.len())
            .finish()
    }
}

/// Point-in-time view of one loader's state and counters
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoaderStats {
    /// Identity of the loader
    pub loader_id: String,
    /// Entries currently cached
    pub cached_entries: usize,
    /// Loads currently in flight
    pub pending_loads: usize,
    /// Keys with a nonzero interaction count
    pub tracked_keys: usize,
    /// Keys with a registered fetcher
    pub registered_keys: usize,
    /// Counter snapshot
    pub counters: LoaderMetricsSnapshot,
}

impl<V: Send + Sync + 'static> LoaderCore<V> {
    /// Assemble a core from its parts; called by the builder
    pub(crate) fn new(
        config: LoaderConfig,
        registry: FetcherRegistry<V>,
        metrics: Arc<MetricsCollector>,
        preload_tx: mpsc::Sender<PreloadRequest>,
    ) -> Self {
        let cache = TtlCache::new(CacheConfig {
            max_age: config.max_age,
            max_entries: config.max_entries,
        });
        let predictor = InteractionPredictor::new(config.preload_threshold);
        Self {
            inner: Arc::new(CoreInner {
                config,
                registry,
                state: Mutex::new(CoreState {
                    cache,
                    pending: HashMap::new(),
                }),
                predictor,
                metrics,
                preload_tx,
            }),
        }
    }

    /// The configuration the loader was built with
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// The loader's registry of key-to-fetcher bindings
    pub fn registry(&self) -> &FetcherRegistry<V> {
        &self.inner.registry
    }

    /// The loader's metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.inner.metrics)
    }

    /// Resolve a resource through the cache, loading on a miss
    ///
    /// Served from cache when a fresh entry exists. Otherwise joins the
    /// in-flight load for the key if there is one, or starts a new episode
    /// with the registered fetcher. Fails fast for unregistered keys.
    pub async fn acquire(&self, key: &ResourceKey) -> Result<Arc<V>> {
        let fetcher = self.inner.registry.resolve(key)?;
        self.acquire_with(key, fetcher).await
    }

    /// Resolve a resource using a caller-supplied fetcher
    ///
    /// Same dedup and caching behavior as [`acquire`](Self::acquire); the
    /// fetcher is only invoked if this call starts a new episode. Empty
    /// keys are rejected before anything is cached under them.
    pub async fn acquire_with(
        &self,
        key: &ResourceKey,
        fetcher: SharedFetcher<V>,
    ) -> Result<Arc<V>> {
        if key.is_empty() {
            return Err(Error::Configuration(
                "resource key must not be empty".to_string(),
            ));
        }
        let counters = self.inner.metrics.metrics();

        let mut rx = {
            let mut state = self.inner.state.lock();
            match state.cache.get(key) {
                Lookup::Hit(value) => {
                    counters.record_hit();
                    tracing::trace!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Lookup::Expired => {
                    counters.record_ttl_evictions(1);
                    counters.record_miss();
                }
                Lookup::Miss => {
                    counters.record_miss();
                }
            }

            if let Some(tx) = state.pending.get(key) {
                counters.record_coalesced_waiter();
                tracing::trace!(key = %key, "Joining in-flight load");
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                state.pending.insert(key.clone(), tx.clone());
                self.spawn_driver(key.clone(), fetcher, tx);
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            // Sender dropped without settling; the driver was torn down
            Err(_) => Err(Error::LoadInterrupted(key.to_string())),
        }
    }

    /// Run one load episode to completion on its own task
    ///
    /// The fetch itself runs on a further task so a panicking fetcher
    /// cannot take the driver down with it; the episode then settles as
    /// interrupted. Settling happens under the state lock: the pending
    /// entry is removed and, on success, the cache is populated in the
    /// same critical section. The outcome is broadcast after the lock is
    /// released.
    fn spawn_driver(
        &self,
        key: ResourceKey,
        fetcher: SharedFetcher<V>,
        tx: broadcast::Sender<LoadOutcome<V>>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let timer = LoadTimer::new(Arc::clone(&inner.metrics));
            tracing::debug!(key = %key, "Load started");

            let fetch = {
                let key = key.clone();
                tokio::spawn(async move { fetcher.fetch(&key).await })
            };
            let outcome: LoadOutcome<V> = match fetch.await {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::LoadInterrupted(key.to_string())),
            };

            {
                let mut state = inner.state.lock();
                state.pending.remove(&key);
                if let Ok(ref value) = outcome {
                    let evicted = state.cache.insert(key.clone(), Arc::clone(value));
                    if !evicted.is_empty() {
                        inner
                            .metrics
                            .metrics()
                            .record_lru_evictions(evicted.len() as u64);
                        tracing::debug!(key = %key, evicted = ?evicted, "Capacity eviction");
                    }
                }
            }

            match &outcome {
                Ok(_) => {
                    timer.complete();
                    tracing::debug!(key = %key, "Load completed");
                }
                Err(e) => {
                    timer.fail();
                    tracing::warn!(key = %key, error = %e, "Load failed");
                }
            }

            // No receivers just means every waiter moved on
            let _ = tx.send(outcome);
        });
    }

    /// Peek at the cache without triggering a load
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<V>> {
        let counters = self.inner.metrics.metrics();
        let mut state = self.inner.state.lock();
        match state.cache.get(key) {
            Lookup::Hit(value) => {
                counters.record_hit();
                Some(value)
            }
            Lookup::Expired => {
                counters.record_ttl_evictions(1);
                counters.record_miss();
                None
            }
            Lookup::Miss => {
                counters.record_miss();
                None
            }
        }
    }

    /// Drop one cached entry; in-flight loads are left to finish
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        let removed = self.inner.state.lock().cache.invalidate(key);
        if removed {
            self.inner.metrics.metrics().record_invalidations(1);
            tracing::debug!(key = %key, "Entry invalidated");
        }
        removed
    }

    /// Drop every cached entry; in-flight loads are left to finish
    pub fn clear(&self) -> usize {
        let dropped = self.inner.state.lock().cache.clear();
        if dropped > 0 {
            self.inner
                .metrics
                .metrics()
                .record_invalidations(dropped as u64);
        }
        tracing::debug!(dropped, "Cache cleared");
        dropped
    }

    /// Invalidate a key and load it again
    ///
    /// The cached entry is dropped first, so the result always comes from a
    /// load episode; if one is already in flight the refresh joins it.
    pub async fn refresh(&self, key: &ResourceKey) -> Result<Arc<V>> {
        let fetcher = self.inner.registry.resolve(key)?;
        {
            let mut state = self.inner.state.lock();
            if state.cache.invalidate(key) {
                self.inner.metrics.metrics().record_invalidations(1);
            }
        }
        tracing::debug!(key = %key, "Refreshing entry");
        self.acquire_with(key, fetcher).await
    }

    /// Remove expired entries now, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let expired = self.inner.state.lock().cache.sweep();
        self.inner
            .metrics
            .metrics()
            .record_sweep_cycle(expired.len() as u64);
        if !expired.is_empty() {
            tracing::debug!(expired = ?expired, "Sweep removed expired entries");
        }
        expired.len()
    }

    /// Record one user interaction with a key
    ///
    /// Counts toward the preload threshold. When the threshold is reached
    /// and the key is neither cached nor loading, a preload request is
    /// queued for the background service. Unregistered keys are rejected.
    pub fn track_interaction(&self, key: &ResourceKey) -> Result<PredictorSignal> {
        if !self.inner.registry.contains(key) {
            return Err(Error::UnknownKey(key.to_string()));
        }
        self.inner.metrics.metrics().record_interaction();
        let signal = self.inner.predictor.record(key);
        if signal.is_fired() {
            self.request_preload(key, signal.interactions());
        }
        Ok(signal)
    }

    fn request_preload(&self, key: &ResourceKey, interactions: u32) {
        {
            let state = self.inner.state.lock();
            if state.cache.contains_fresh(key) || state.pending.contains_key(key) {
                tracing::trace!(key = %key, "Preload signal ignored; key already warm");
                return;
            }
        }

        match self
            .inner
            .preload_tx
            .try_send(PreloadRequest::new(key.clone(), interactions))
        {
            Ok(()) => {
                self.inner.metrics.metrics().record_preload_triggered();
                tracing::debug!(key = %key, interactions, "Preload queued");
            }
            Err(e) => {
                self.inner.metrics.metrics().record_preload_dropped();
                tracing::warn!(key = %key, error = %e, "Preload request dropped");
            }
        }
    }

    /// True if a fresh entry exists for the key
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.inner.state.lock().cache.contains_fresh(key)
    }

    /// True if a load is in flight for the key
    pub fn is_pending(&self, key: &ResourceKey) -> bool {
        self.inner.state.lock().pending.contains_key(key)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    /// True if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().cache.is_empty()
    }

    /// Metadata for one cached entry
    pub fn entry_info(&self, key: &ResourceKey) -> Option<EntryInfo> {
        self.inner.state.lock().cache.entry_info(key)
    }

    /// Keys currently cached, in no particular order
    pub fn cached_keys(&self) -> Vec<ResourceKey> {
        self.inner.state.lock().cache.keys()
    }

    /// Point-in-time stats for the loader
    pub fn stats(&self) -> LoaderStats {
        let (cached_entries, pending_loads) = {
            let state = self.inner.state.lock();
            (state.cache.len(), state.pending.len())
        };
        LoaderStats {
            loader_id: self.inner.config.loader_id.clone(),
            cached_entries,
            pending_loads,
            tracked_keys: self.inner.predictor.tracked_keys(),
            registered_keys: self.inner.registry.len(),
            counters: self.inner.metrics.metrics().snapshot(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
