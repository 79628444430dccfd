//! Loader Metrics and Observability
//!
//! Provides detailed metrics about cache and load behavior for monitoring
//! and tuning purposes.
//!
//! # Metrics Collected
//!
//! - Cache hit/miss counts and hit rate
//! - Load outcomes and latency
//! - Waiters coalesced onto in-flight loads
//! - Evictions by reason (capacity vs expiry)
//! - Preload decisions (triggered, skipped, dropped)
//! - Sweep cycles
//!
//! # Example
//!
//! ```rust,ignore
//! use prewarm::cache::metrics::LoaderMetrics;
//!
//! let metrics = LoaderMetrics::new();
//!
//! // Record a served request
//! metrics.record_hit();
//!
//! // Get current stats
//! let stats = metrics.snapshot();
//! println!("Hit rate: {:.2}", stats.hit_rate());
//! ```
//!
//! Metrics are per-loader: each [`LoaderMetrics`] belongs to the loader that
//! created it and is shared with its background services via `Arc`. There is
//! no process-global collector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Atomic counters for a single loader's activity
#[derive(Debug, Default)]
pub struct LoaderMetrics {
    /// Requests served from cache
    pub hits: AtomicU64,
    /// Requests not served from cache (cold or expired)
    pub misses: AtomicU64,
    /// Loads started (one per miss episode, shared by coalesced waiters)
    pub loads_started: AtomicU64,
    /// Loads that produced a value
    pub loads_succeeded: AtomicU64,
    /// Loads that ended in an error
    pub loads_failed: AtomicU64,
    /// Total load time in microseconds
    pub load_time_us: AtomicU64,
    /// Requests that joined an already in-flight load
    pub coalesced_waiters: AtomicU64,
    /// Entries evicted to stay within the entry bound
    pub evictions_lru: AtomicU64,
    /// Entries removed because they exceeded max age
    pub evictions_ttl: AtomicU64,
    /// Entries removed by explicit invalidation or clear
    pub invalidations: AtomicU64,
    /// Interactions recorded against tracked keys
    pub interactions: AtomicU64,
    /// Preloads handed to the background service
    pub preloads_triggered: AtomicU64,
    /// Preloads skipped because the connection was constrained
    pub preloads_skipped_network: AtomicU64,
    /// Preloads dropped because the queue was full
    pub preloads_dropped: AtomicU64,
    /// Completed sweep cycles
    pub sweep_cycles: AtomicU64,
}

impl LoaderMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request served from cache
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that was not served from cache
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the start of a load episode
    pub fn record_load_started(&self) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a load that produced a value
    pub fn record_load_success(&self, duration_us: u64) {
        self.loads_succeeded.fetch_add(1, Ordering::Relaxed);
        self.load_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Record a load that ended in an error
    pub fn record_load_failure(&self, duration_us: u64) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
        self.load_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Record a request that joined an in-flight load
    pub fn record_coalesced_waiter(&self) {
        self.coalesced_waiters.fetch_add(1, Ordering::Relaxed);
    }

    /// Record entries evicted for capacity
    pub fn record_lru_evictions(&self, count: u64) {
        self.evictions_lru.fetch_add(count, Ordering::Relaxed);
    }

    /// Record entries removed for age, lazily or by sweep
    pub fn record_ttl_evictions(&self, count: u64) {
        self.evictions_ttl.fetch_add(count, Ordering::Relaxed);
    }

    /// Record entries removed by invalidate or clear
    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an interaction against a tracked key
    pub fn record_interaction(&self) {
        self.interactions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a preload handed to the background service
    pub fn record_preload_triggered(&self) {
        self.preloads_triggered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a preload skipped for a constrained connection
    pub fn record_preload_skipped_network(&self) {
        self.preloads_skipped_network.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a preload dropped because the queue was full
    pub fn record_preload_dropped(&self) {
        self.preloads_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed sweep cycle and the entries it expired
    pub fn record_sweep_cycle(&self, expired: u64) {
        self.sweep_cycles.fetch_add(1, Ordering::Relaxed);
        self.evictions_ttl.fetch_add(expired, Ordering::Relaxed);
    }

    /// Fraction of requests served from cache
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }

    /// Average load time in microseconds
    pub fn avg_load_time_us(&self) -> f64 {
        let completed = self.loads_succeeded.load(Ordering::Relaxed)
            + self.loads_failed.load(Ordering::Relaxed);
        let time = self.load_time_us.load(Ordering::Relaxed);
        if completed == 0 {
            0.0
        } else {
            time as f64 / completed as f64
        }
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> LoaderMetricsSnapshot {
        LoaderMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_succeeded: self.loads_succeeded.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            load_time_us: self.load_time_us.load(Ordering::Relaxed),
            coalesced_waiters: self.coalesced_waiters.load(Ordering::Relaxed),
            evictions_lru: self.evictions_lru.load(Ordering::Relaxed),
            evictions_ttl: self.evictions_ttl.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            interactions: self.interactions.load(Ordering::Relaxed),
            preloads_triggered: self.preloads_triggered.load(Ordering::Relaxed),
            preloads_skipped_network: self.preloads_skipped_network.load(Ordering::Relaxed),
            preloads_dropped: self.preloads_dropped.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
        }
    }
}

/// Non-atomic snapshot of loader metrics for serialization
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LoaderMetricsSnapshot {
    /// Requests served from cache
    pub hits: u64,
    /// Requests not served from cache
    pub misses: u64,
    /// Loads started
    pub loads_started: u64,
    /// Loads that produced a value
    pub loads_succeeded: u64,
    /// Loads that ended in an error
    pub loads_failed: u64,
    /// Total load time in microseconds
    pub load_time_us: u64,
    /// Requests that joined an in-flight load
    pub coalesced_waiters: u64,
    /// Entries evicted for capacity
    pub evictions_lru: u64,
    /// Entries removed for age
    pub evictions_ttl: u64,
    /// Entries removed by invalidate or clear
    pub invalidations: u64,
    /// Interactions recorded against tracked keys
    pub interactions: u64,
    /// Preloads handed to the background service
    pub preloads_triggered: u64,
    /// Preloads skipped for a constrained connection
    pub preloads_skipped_network: u64,
    /// Preloads dropped because the queue was full
    pub preloads_dropped: u64,
    /// Completed sweep cycles
    pub sweep_cycles: u64,
}

impl LoaderMetricsSnapshot {
    /// Fraction of requests served from cache
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    /// Average load time in microseconds
    pub fn avg_load_time_us(&self) -> f64 {
        let completed = self.loads_succeeded + self.loads_failed;
        if completed == 0 {
            0.0
        } else {
            self.load_time_us as f64 / completed as f64
        }
    }
}

/// Loader metrics collector with uptime tracking
///
/// Wraps the raw counters with the loader's identity and start time so
/// exported metrics can be attributed to one loader instance.
#[derive(Debug)]
pub struct MetricsCollector {
    /// Identity of the loader the metrics belong to
    loader_id: String,
    /// The counters themselves
    metrics: LoaderMetrics,
    /// Creation timestamp
    created_at: Instant,
}

impl MetricsCollector {
    /// Create a collector for the given loader
    pub fn new(loader_id: impl Into<String>) -> Self {
        Self {
            loader_id: loader_id.into(),
            metrics: LoaderMetrics::new(),
            created_at: Instant::now(),
        }
    }

    /// The loader this collector belongs to
    pub fn loader_id(&self) -> &str {
        &self.loader_id
    }

    /// The raw counters
    pub fn metrics(&self) -> &LoaderMetrics {
        &self.metrics
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    /// Create a full snapshot including uptime
    pub fn report(&self) -> LoaderReport {
        let counters = self.metrics.snapshot();
        let hit_rate = counters.hit_rate();
        let avg_load_time_us = counters.avg_load_time_us();
        LoaderReport {
            loader_id: self.loader_id.clone(),
            uptime_secs: self.uptime_secs(),
            counters,
            hit_rate,
            avg_load_time_us,
        }
    }

    /// Format as Prometheus metrics
    pub fn to_prometheus(&self) -> String {
        let report = self.report();
        let id = &report.loader_id;
        let mut output = String::new();

        output.push_str("# HELP prewarm_hit_rate Fraction of requests served from cache\n");
        output.push_str("# TYPE prewarm_hit_rate gauge\n");
        output.push_str(&format!(
            "prewarm_hit_rate{{loader=\"{}\"}} {:.4}\n",
            id, report.hit_rate
        ));

        output.push_str("# HELP prewarm_load_time_avg_us Average load time in microseconds\n");
        output.push_str("# TYPE prewarm_load_time_avg_us gauge\n");
        output.push_str(&format!(
            "prewarm_load_time_avg_us{{loader=\"{}\"}} {:.4}\n",
            id, report.avg_load_time_us
        ));

        output.push_str("# HELP prewarm_requests_total Requests by cache outcome\n");
        output.push_str("# TYPE prewarm_requests_total counter\n");
        output.push_str(&format!(
            "prewarm_requests_total{{loader=\"{}\",outcome=\"hit\"}} {}\n",
            id, report.counters.hits
        ));
        output.push_str(&format!(
            "prewarm_requests_total{{loader=\"{}\",outcome=\"miss\"}} {}\n",
            id, report.counters.misses
        ));
        output.push_str(&format!(
            "prewarm_requests_total{{loader=\"{}\",outcome=\"coalesced\"}} {}\n",
            id, report.counters.coalesced_waiters
        ));

        output.push_str("# HELP prewarm_loads_total Load episodes by outcome\n");
        output.push_str("# TYPE prewarm_loads_total counter\n");
        output.push_str(&format!(
            "prewarm_loads_total{{loader=\"{}\",outcome=\"success\"}} {}\n",
            id, report.counters.loads_succeeded
        ));
        output.push_str(&format!(
            "prewarm_loads_total{{loader=\"{}\",outcome=\"failure\"}} {}\n",
            id, report.counters.loads_failed
        ));

        output.push_str("# HELP prewarm_evictions_total Entries removed by reason\n");
        output.push_str("# TYPE prewarm_evictions_total counter\n");
        output.push_str(&format!(
            "prewarm_evictions_total{{loader=\"{}\",reason=\"lru\"}} {}\n",
            id, report.counters.evictions_lru
        ));
        output.push_str(&format!(
            "prewarm_evictions_total{{loader=\"{}\",reason=\"ttl\"}} {}\n",
            id, report.counters.evictions_ttl
        ));
        output.push_str(&format!(
            "prewarm_evictions_total{{loader=\"{}\",reason=\"invalidated\"}} {}\n",
            id, report.counters.invalidations
        ));

        output.push_str("# HELP prewarm_preloads_total Preload decisions by outcome\n");
        output.push_str("# TYPE prewarm_preloads_total counter\n");
        output.push_str(&format!(
            "prewarm_preloads_total{{loader=\"{}\",outcome=\"triggered\"}} {}\n",
            id, report.counters.preloads_triggered
        ));
        output.push_str(&format!(
            "prewarm_preloads_total{{loader=\"{}\",outcome=\"skipped_network\"}} {}\n",
            id, report.counters.preloads_skipped_network
        ));
        output.push_str(&format!(
            "prewarm_preloads_total{{loader=\"{}\",outcome=\"dropped\"}} {}\n",
            id, report.counters.preloads_dropped
        ));

        output.push_str("# HELP prewarm_sweep_cycles_total Completed sweep cycles\n");
        output.push_str("# TYPE prewarm_sweep_cycles_total counter\n");
        output.push_str(&format!(
            "prewarm_sweep_cycles_total{{loader=\"{}\"}} {}\n",
            id, report.counters.sweep_cycles
        ));

        output
    }
}

/// Full snapshot of one loader's metrics for serialization
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoaderReport {
    /// Identity of the loader
    pub loader_id: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Raw counters
    pub counters: LoaderMetricsSnapshot,
    /// Fraction of requests served from cache
    pub hit_rate: f64,
    /// Average load time in microseconds
    pub avg_load_time_us: f64,
}

/// RAII guard for timing load episodes
///
/// A timer dropped without [`LoadTimer::complete`] or [`LoadTimer::fail`]
/// counts as a failure so abandoned episodes are never silently lost.
pub struct LoadTimer {
    start: Instant,
    metrics: Arc<MetricsCollector>,
    completed: bool,
}

impl LoadTimer {
    /// Start timing a load episode
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        metrics.metrics().record_load_started();
        Self {
            start: Instant::now(),
            metrics,
            completed: false,
        }
    }

    /// Complete the timer after a successful load
    pub fn complete(mut self) {
        let duration_us = self.start.elapsed().as_micros() as u64;
        self.metrics.metrics().record_load_success(duration_us);
        self.completed = true;
    }

    /// Complete the timer after a failed load
    pub fn fail(mut self) {
        let duration_us = self.start.elapsed().as_micros() as u64;
        self.metrics.metrics().record_load_failure(duration_us);
        self.completed = true;
    }
}

impl Drop for LoadTimer {
    fn drop(&mut self) {
        if !self.completed {
            // If not completed, assume failure
            let duration_us = self.start.elapsed().as_micros() as u64;
            self.metrics.metrics().record_load_failure(duration_us);
        }
    }
}
