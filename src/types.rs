//! Core data types used throughout the loader

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Opaque identifier for a loadable resource
///
/// A key names one loadable unit (a module bundle, a data blob, a computed
/// artifact). Keys are unique within a registry and compared as plain
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(pub String);

impl ResourceKey {
    /// Create a new key from anything string-like
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the key is the empty string (rejected at API boundaries)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Observed network quality, as reported by a [`ConnectionProbe`]
///
/// Probes that cannot observe the link report [`ConnectionQuality::Unknown`],
/// which is treated the same as a good connection: only a positively
/// identified slow link suppresses speculative work.
///
/// [`ConnectionProbe`]: crate::loader::ConnectionProbe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionQuality {
    /// Link is fast enough for speculative loads
    Fast,
    /// Link is constrained; speculative loads are skipped
    Slow,
    /// No signal available (default for runtimes without a probe)
    Unknown,
}

impl ConnectionQuality {
    /// True only for links where speculative loads should be suppressed
    pub fn is_constrained(&self) -> bool {
        matches!(self, ConnectionQuality::Slow)
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionQuality::Fast => "fast",
            ConnectionQuality::Slow => "slow",
            ConnectionQuality::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// Priority of a scheduled background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Run immediately, skipping idle deferral
    High,
    /// Defer to idle time with the configured timeout bound
    #[default]
    Normal,
    /// Defer to idle time; first to shed under pressure
    Low,
}

impl Priority {
    /// True if the task should bypass idle deferral entirely
    pub fn is_immediate(&self) -> bool {
        matches!(self, Priority::High)
    }
}

/// A speculative load queued by the interaction predictor
///
/// Carried over the preload channel from [`track_interaction`] to the
/// preload service, which applies the network gate and idle deferral
/// before running the registered fetcher.
///
/// [`track_interaction`]: crate::DeferredLoader::track_interaction
#[derive(Debug, Clone)]
pub struct PreloadRequest {
    /// Key to warm
    pub key: ResourceKey,
    /// Interaction count observed when the threshold fired
    pub interactions: u32,
    /// When the request was enqueued
    pub requested_at: Instant,
}

impl PreloadRequest {
    /// Create a new preload request for a key
    pub fn new(key: ResourceKey, interactions: u32) -> Self {
        Self {
            key,
            interactions,
            requested_at: Instant::now(),
        }
    }

    /// Time the request has spent queued
    pub fn queued_for(&self) -> std::time::Duration {
        self.requested_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_roundtrip() {
        let key = ResourceKey::new("nutrition-tracker");
        assert_eq!(key.as_str(), "nutrition-tracker");
        assert_eq!(key.to_string(), "nutrition-tracker");
        assert_eq!(ResourceKey::from("nutrition-tracker"), key);
        assert!(!key.is_empty());
        assert!(ResourceKey::new("").is_empty());
    }

    #[test]
    fn test_connection_quality() {
        assert!(ConnectionQuality::Slow.is_constrained());
        assert!(!ConnectionQuality::Fast.is_constrained());
        // Unknown degrades gracefully: it must not gate speculative loads
        assert!(!ConnectionQuality::Unknown.is_constrained());
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::High.is_immediate());
        assert!(!Priority::Low.is_immediate());
    }

    #[test]
    fn test_preload_request() {
        let req = PreloadRequest::new(ResourceKey::new("workout-log"), 2);
        assert_eq!(req.key.as_str(), "workout-log");
        assert_eq!(req.interactions, 2);
        assert!(req.queued_for() < std::time::Duration::from_secs(1));
    }
}
