//! Capability traits at the loader's seams
//!
//! The loader never talks to the outside world directly. Everything
//! environment-shaped comes in through these traits so callers can inject
//! real implementations in production and deterministic ones in tests:
//!
//! - [`ResourceFetcher`]: produces the value for a key
//! - [`IdleScheduler`]: signals low-activity windows for deferred work
//! - [`ConnectionProbe`]: reports connection quality for preload gating

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConnectionQuality, ResourceKey};

/// Boxed future used by the closure fetcher adapter
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Shared handle to a registered fetcher
pub type SharedFetcher<V> = Arc<dyn ResourceFetcher<V>>;

/// Produces the value for a resource key
///
/// One fetcher is registered per key at build time. The loader invokes it
/// at most once per miss episode; concurrent requests for the same key
/// share the single in-flight call.
#[async_trait]
pub trait ResourceFetcher<V>: Send + Sync {
    /// Fetch the resource identified by `key`
    ///
    /// An `Err` is fanned out to every waiter of the episode and nothing
    /// is cached, so the next request retries from scratch.
    async fn fetch(&self, key: &ResourceKey) -> Result<V>;
}

/// Adapter turning an async closure into a [`ResourceFetcher`]
///
/// Lets call sites register plain `async` closures without writing a
/// trait impl:
///
/// ```rust,ignore
/// builder.register_fn("workout:videos", |_key| async {
///     Ok(fetch_videos().await?)
/// });
/// ```
pub struct FnFetcher<V> {
    fetch: Box<dyn Fn(ResourceKey) -> BoxFuture<Result<V>> + Send + Sync>,
}

impl<V> FnFetcher<V> {
    /// Wrap an async closure as a fetcher
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(ResourceKey) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            fetch: Box::new(move |key| Box::pin(fetch(key))),
        }
    }
}

#[async_trait]
impl<V: Send + 'static> ResourceFetcher<V> for FnFetcher<V> {
    async fn fetch(&self, key: &ResourceKey) -> Result<V> {
        (self.fetch)(key.clone()).await
    }
}

impl<V> std::fmt::Debug for FnFetcher<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

/// Waits for a low-activity window before deferred work runs
///
/// Implementations resolve when the host signals idleness or when the
/// budget elapses, whichever comes first. Resolution is permission to
/// proceed; it carries no payload.
#[async_trait]
pub trait IdleScheduler: Send + Sync {
    /// Resolve once idle, or once `budget` has elapsed
    async fn wait_for_idle(&self, budget: Duration);
}

#[async_trait]
impl<T: IdleScheduler + ?Sized> IdleScheduler for Arc<T> {
    async fn wait_for_idle(&self, budget: Duration) {
        (**self).wait_for_idle(budget).await
    }
}

/// Reports the quality of the connection loads will ride on
///
/// Read at decision time, never cached by the loader, so a quality change
/// between two preload decisions is observed by the second one. Hosts that
/// update the reading over time keep their probe in an `Arc` and hand a
/// clone to the builder.
pub trait ConnectionProbe: Send + Sync {
    /// Current connection quality; `Unknown` when it cannot be read
    fn quality(&self) -> ConnectionQuality;
}

impl<T: ConnectionProbe + ?Sized> ConnectionProbe for Arc<T> {
    fn quality(&self) -> ConnectionQuality {
        (**self).quality()
    }
}
