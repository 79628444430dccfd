//! Cache Module for Prewarm
//!
//! This module holds the storage side of the loader: the TTL + LRU store
//! that keeps resolved resources, and the metrics that describe how the
//! store and its loads behave. It provides:
//!
//! - **TTL Store**: bounded map with age expiry and LRU eviction (`store.rs`)
//! - **Metrics**: atomic counters, snapshots and exports (`metrics.rs`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Loader Core                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │   ┌──────────────────┐         ┌──────────────────────┐      │
//! │   │    TtlCache      │         │   MetricsCollector   │      │
//! │   │  10 entries, LRU │         │   atomic counters    │      │
//! │   │  300s max age    │         │   per-loader scope   │      │
//! │   └──────────────────┘         └──────────────────────┘      │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use prewarm::cache::{CacheConfig, TtlCache};
//!
//! let mut cache = TtlCache::new(CacheConfig::default());
//! cache.insert("workout:videos".into(), value);
//!
//! let stats = collector.report();
//! println!("Hit rate: {:.2}%", stats.hit_rate * 100.0);
//! ```

// TTL + LRU store for resolved resources
mod store;
pub use store::{CacheConfig, EntryInfo, Lookup, TtlCache};

// Metrics, snapshots and exports
pub mod metrics;
pub use metrics::{
    LoadTimer, LoaderMetrics, LoaderMetricsSnapshot, LoaderReport, MetricsCollector,
};
