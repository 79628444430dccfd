//! Scheduling Module for Prewarm
//!
//! Deferred work (preloads, caller-scheduled tasks) waits for a quiet
//! moment before it runs. This module provides the pieces that decide
//! when that moment is:
//!
//! - **Idle scheduling**: fixed-delay and immediate fallbacks plus the
//!   deferred spawn helper (`idle.rs`)
//! - **Connection probes**: quality readings that gate speculative work
//!   (`probe.rs`)
//!
//! Hosts with a native idleness signal implement
//! [`IdleScheduler`](crate::loader::traits::IdleScheduler) themselves and
//! inject it through the builder; the types here are the defaults.

// Idle waiting and deferred spawning
mod idle;
pub use idle::{
    spawn_deferred, DelayScheduler, ImmediateScheduler, ScheduleOptions, MAX_FALLBACK_DELAY,
};

// Connection quality probes
mod probe;
pub use probe::ManualProbe;
