//! Idle scheduling fallbacks and deferred task spawning
//!
//! Hosts with a real idleness signal implement
//! [`IdleScheduler`](crate::loader::traits::IdleScheduler) themselves and
//! inject it at build time. This module ships the two implementations the
//! crate can provide on its own: a fixed-delay approximation for hosts
//! with no signal, and an immediate scheduler for tests and eager hosts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::loader::traits::IdleScheduler;
use crate::types::Priority;

/// Upper bound on the fixed fallback delay
pub const MAX_FALLBACK_DELAY: Duration = Duration::from_secs(2);

/// Options for one deferred run
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Longest the task may wait for an idle window
    pub timeout: Duration,

    /// Priority of the task; high priority skips the idle wait
    pub priority: Priority,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            priority: Priority::Normal,
        }
    }
}

/// Fixed-delay stand-in for a host idleness signal
///
/// Approximates "wait until idle" with a short sleep. The delay is clamped
/// to [`MAX_FALLBACK_DELAY`] at construction and to the caller's budget at
/// wait time, so a generous configuration can never stall deferred work
/// past the window the caller allowed.
#[derive(Debug, Clone)]
pub struct DelayScheduler {
    delay: Duration,
}

impl DelayScheduler {
    /// Create a scheduler sleeping `delay` per wait, clamped to
    /// [`MAX_FALLBACK_DELAY`]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.min(MAX_FALLBACK_DELAY),
        }
    }

    /// The effective per-wait delay
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl IdleScheduler for DelayScheduler {
    async fn wait_for_idle(&self, budget: Duration) {
        tokio::time::sleep(self.delay.min(budget)).await;
    }
}

/// Scheduler that reports idle immediately
///
/// Useful in tests and on hosts where deferred work should run as soon as
/// the executor gets to it.
#[derive(Debug, Clone, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl IdleScheduler for ImmediateScheduler {
    async fn wait_for_idle(&self, _budget: Duration) {}
}

/// Spawn `task` to run after an idle window
///
/// High-priority tasks skip the idle wait entirely; everything else waits
/// on the scheduler with `options.timeout` as the budget. The task runs on
/// its own tokio task either way, so the caller is never blocked.
pub fn spawn_deferred<F, Fut, T>(
    scheduler: Arc<dyn IdleScheduler>,
    options: ScheduleOptions,
    task: F,
) -> JoinHandle<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if !options.priority.is_immediate() {
            scheduler.wait_for_idle(options.timeout).await;
        }
        task().await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_delay_clamped_at_construction() {
        let scheduler = DelayScheduler::new(Duration::from_secs(30));
        assert_eq!(scheduler.delay(), MAX_FALLBACK_DELAY);

        let scheduler = DelayScheduler::default();
        assert_eq!(scheduler.delay(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_wait_clamped_to_budget() {
        let scheduler = DelayScheduler::new(Duration::from_millis(500));

        let start = Instant::now();
        scheduler.wait_for_idle(Duration::from_millis(20)).await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_immediate_scheduler_does_not_wait() {
        let start = Instant::now();
        ImmediateScheduler
            .wait_for_idle(Duration::from_secs(10))
            .await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_spawn_deferred_waits_then_runs() {
        let scheduler: Arc<dyn IdleScheduler> =
            Arc::new(DelayScheduler::new(Duration::from_millis(30)));

        let start = Instant::now();
        let handle = spawn_deferred(scheduler, ScheduleOptions::default(), || async { 7 });
        assert_eq!(handle.await.unwrap(), 7);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_high_priority_skips_idle_wait() {
        let scheduler: Arc<dyn IdleScheduler> =
            Arc::new(DelayScheduler::new(Duration::from_millis(500)));

        let options = ScheduleOptions {
            timeout: Duration::from_secs(2),
            priority: Priority::High,
        };

        let start = Instant::now();
        let handle = spawn_deferred(scheduler, options, || async { "now" });
        assert_eq!(handle.await.unwrap(), "now");
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
