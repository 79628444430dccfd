//! Deferred resource loading with TTL caching and speculative prewarming
//!
//! This crate loads expensive resources on demand, keeps them in a small
//! TTL cache with LRU eviction, collapses concurrent loads for the same
//! key into a single fetch, and watches user interactions to warm likely
//! resources in the background before they are requested.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       DeferredLoader                         │
//! │   acquire / get / invalidate / track_interaction / schedule  │
//! └──────┬───────────────────────┬──────────────────────┬────────┘
//!        │                       │                      │
//!        ▼                       ▼                      ▼
//! ┌──────────────┐       ┌──────────────┐       ┌──────────────┐
//! │  LoaderCore  │       │ Interaction  │       │     Idle     │
//! │  TTL cache + │       │  Predictor   │       │  Scheduler   │
//! │  load dedup  │       └──────┬───────┘       └──────┬───────┘
//! └──────▲───────┘              │                      │
//!        │                preload queue                │
//!        │                      ▼                      ▼
//! ┌──────┴───────┐       ┌─────────────────────────────────────┐
//! │   Sweeper    │       │            PreloadService           │
//! │   Service    │       │   idle wait -> probe -> acquire     │
//! └──────────────┘       └─────────────────────────────────────┘
//! ```
//!
//! Every loader is an independent instance: its cache, metrics and
//! background services are created by [`LoaderBuilder::build`] and owned
//! by the returned handle. Environment capabilities (idle detection,
//! connection quality) are injected as traits so hosts and tests can
//! substitute their own.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> prewarm::Result<()> {
//! use prewarm::LoaderBuilder;
//!
//! let loader = LoaderBuilder::new()
//!     .loader_id("app")
//!     .register_fn("member:profile", |_| async { Ok("marcus") })
//!     .build()
//!     .await?;
//!
//! // First acquire fetches; later acquires hit the cache
//! let profile = loader.acquire("member:profile").await?;
//! assert_eq!(*profile, "marcus");
//!
//! // Repeated interactions queue a background preload for the key
//! loader.track_interaction("member:profile")?;
//!
//! loader.shutdown_gracefully().await
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod loader;
pub mod predictor;
pub mod schedule;
pub mod services;
pub mod types;

pub use error::{Error, Result};
pub use loader::{
    ConnectionProbe, DeferredLoader, FnFetcher, IdleScheduler, LoaderBuilder, LoaderConfig,
    LoaderStats, ResourceFetcher,
};
pub use predictor::PredictorSignal;
pub use schedule::{DelayScheduler, ImmediateScheduler, ManualProbe, ScheduleOptions};
pub use types::{ConnectionQuality, Priority, ResourceKey};
