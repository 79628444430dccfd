//! Deferred resource loading
//!
//! The loader resolves [`ResourceKey`]s to values through a TTL cache,
//! deduplicating concurrent loads and predicting which keys to warm from
//! interaction signals.
//!
//! ```text
//!   acquire(key)
//!        │
//!        ▼
//! ┌─────────────┐   hit    ┌─────────────────┐
//! │  TtlCache   │─────────▶│      value      │
//! └──────┬──────┘          └─────────────────┘
//!        │ miss
//!        ▼
//! ┌─────────────┐ in flight┌─────────────────┐
//! │  pending?   │─────────▶│ await broadcast │
//! └──────┬──────┘          └─────────────────┘
//!        │ no
//!        ▼
//! ┌─────────────┐  settle  ┌─────────────────┐
//! │  registry   │─────────▶│   driver task   │
//! │  fetcher    │          │   cache + send  │
//! └─────────────┘          └─────────────────┘
//! ```
//!
//! [`LoaderBuilder`] assembles the pieces; [`DeferredLoader`] is the
//! handle applications hold.
//!
//! [`ResourceKey`]: crate::types::ResourceKey

pub mod builder;
pub mod core;
pub mod handle;
pub mod registry;
pub mod traits;

pub use self::core::{LoaderCore, LoaderStats};
pub use builder::{LoaderBuilder, LoaderConfig};
pub use handle::DeferredLoader;
pub use registry::FetcherRegistry;
pub use traits::{
    BoxFuture, ConnectionProbe, FnFetcher, IdleScheduler, ResourceFetcher, SharedFetcher,
};
