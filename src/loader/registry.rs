//! Fetcher registry mapping resource keys to their loaders
//!
//! The registry is assembled by the builder and frozen when the loader is
//! built. Lookups never race registration: a key either has a fetcher for
//! the loader's whole lifetime or it never does, and requests for unknown
//! keys fail fast without touching the cache.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::ResourceKey;

use super::traits::SharedFetcher;

/// Immutable key-to-fetcher table
pub struct FetcherRegistry<V> {
    fetchers: HashMap<ResourceKey, SharedFetcher<V>>,
}

impl<V> FetcherRegistry<V> {
    /// Freeze a fetcher table assembled by the builder
    pub(crate) fn new(fetchers: HashMap<ResourceKey, SharedFetcher<V>>) -> Self {
        Self { fetchers }
    }

    /// Look up the fetcher for a key
    pub fn get(&self, key: &ResourceKey) -> Option<SharedFetcher<V>> {
        self.fetchers.get(key).cloned()
    }

    /// Look up the fetcher for a key, failing on unregistered keys
    pub fn resolve(&self, key: &ResourceKey) -> Result<SharedFetcher<V>> {
        self.get(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    /// True if a fetcher is registered for the key
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.fetchers.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.fetchers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    /// True if no keys are registered
    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

impl<V> std::fmt::Debug for FetcherRegistry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::traits::FnFetcher;
    use std::sync::Arc;

    fn registry() -> FetcherRegistry<u32> {
        let mut fetchers: HashMap<ResourceKey, SharedFetcher<u32>> = HashMap::new();
        fetchers.insert(
            ResourceKey::new("profile"),
            Arc::new(FnFetcher::new(|_| async { Ok(1) })),
        );
        fetchers.insert(
            ResourceKey::new("history"),
            Arc::new(FnFetcher::new(|_| async { Ok(2) })),
        );
        FetcherRegistry::new(fetchers)
    }

    #[tokio::test]
    async fn test_resolve_registered_key() {
        let registry = registry();
        let fetcher = registry.resolve(&ResourceKey::new("profile")).unwrap();
        assert_eq!(fetcher.fetch(&ResourceKey::new("profile")).await.unwrap(), 1);
    }

    #[test]
    fn test_resolve_unknown_key_fails() {
        let registry = registry();
        let err = registry.resolve(&ResourceKey::new("nope")).err().unwrap();
        assert!(matches!(err, Error::UnknownKey(_)));
    }

    #[test]
    fn test_keys_sorted() {
        let registry = registry();
        assert_eq!(
            registry.keys(),
            vec![ResourceKey::new("history"), ResourceKey::new("profile")]
        );
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(registry.contains(&ResourceKey::new("history")));
    }
}
