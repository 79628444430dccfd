//! Error types for the loader
//!
//! Every variant is `Clone` because a single load failure is fanned out to
//! all waiters of the same in-flight episode.

use thiserror::Error;

/// Main error type for the loader
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A fetcher rejected while producing a resource
    #[error("Load failed for '{key}': {message}")]
    LoadFailed {
        /// Key the load was started for
        key: String,
        /// Failure description from the fetcher
        message: String,
    },

    /// No fetcher is registered for the requested key
    #[error("Unknown resource key: {0}")]
    UnknownKey(String),

    /// The load episode died without settling (e.g. a panicked fetcher)
    #[error("Load interrupted for '{0}'")]
    LoadInterrupted(String),

    /// A background service could not be started or failed
    #[error("Background service error: {0}")]
    Service(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The loader is shutting down or already shut down
    #[error("Loader shut down: {0}")]
    Shutdown(String),
}

impl Error {
    /// Build a [`Error::LoadFailed`] from a key and any displayable cause.
    ///
    /// Fetcher implementations typically call this when translating their
    /// transport or parse errors into a loader failure.
    pub fn load_failed(key: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::LoadFailed {
            key: key.into(),
            message: cause.to_string(),
        }
    }

    /// True for failures produced by a fetcher rather than by the loader
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Error::LoadFailed { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_failed_constructor() {
        let err = Error::load_failed("nutrition", "connection reset");
        match &err {
            Error::LoadFailed { key, message } => {
                assert_eq!(key, "nutrition");
                assert_eq!(message, "connection reset");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.is_load_failure());
        assert_eq!(
            err.to_string(),
            "Load failed for 'nutrition': connection reset"
        );
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = Error::UnknownKey("workout".to_string());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
        assert!(!cloned.is_load_failure());
    }
}
