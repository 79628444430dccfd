//! TTL + LRU store for resolved resources
//!
//! The store is a plain data structure: callers provide exclusive access
//! (the loader core keeps it behind a single mutex together with the
//! pending-load table so cached/pending checks stay atomic). Entries expire
//! after `max_age` and are evicted least-recently-used first once the entry
//! count exceeds `max_entries`.
//!
//! Expiry is enforced twice: lazily, whenever an expired entry is touched by
//! a lookup, and eagerly by [`TtlCache::sweep`], which the sweeper service
//! runs on a fixed interval so keys that are never re-read still get
//! reclaimed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::ResourceKey;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the TTL cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of an entry before it expires
    pub max_age: Duration,

    /// Maximum number of entries held at once
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(300), // 5 minutes
            max_entries: 10,
        }
    }
}

// ============================================================================
// Entries
// ============================================================================

/// A cached resource with its bookkeeping metadata
#[derive(Debug)]
struct CacheEntry<V> {
    /// The resolved resource, handed to callers as `Arc` clones
    value: Arc<V>,

    /// When the value was produced (reset on overwrite)
    created_at: Instant,

    /// When the entry was last returned to a caller
    last_accessed: Instant,

    /// Monotonic recency stamp; smallest stamp is evicted first
    access_seq: u64,

    /// Number of times the entry has been returned
    access_count: u64,
}

/// Read-only view of one entry's metadata
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Key the entry is stored under
    pub key: ResourceKey,

    /// Time since the value was produced
    pub age: Duration,

    /// Time since the entry was last returned to a caller
    pub idle: Duration,

    /// Number of times the entry has been returned
    pub access_count: u64,
}

/// Outcome of a cache lookup
///
/// `Expired` is distinguished from `Miss` so callers can count TTL
/// evictions separately from cold misses; both mean "not served".
#[derive(Debug)]
pub enum Lookup<V> {
    /// Fresh entry; recency was updated
    Hit(Arc<V>),
    /// Entry existed but exceeded `max_age`; it has been removed
    Expired,
    /// No entry for the key
    Miss,
}

impl<V> Lookup<V> {
    /// Extract the value for callers that treat expired and missing alike
    pub fn value(self) -> Option<Arc<V>> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Expired | Lookup::Miss => None,
        }
    }

    /// True if the lookup was served from cache
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

// ============================================================================
// Store
// ============================================================================

/// TTL + LRU store for resolved resources
///
/// Invariant: at most one entry per key. Recency ordering uses a monotonic
/// access counter rather than timestamps so evictions are deterministic even
/// when accesses land on the same clock tick.
#[derive(Debug)]
pub struct TtlCache<V> {
    config: CacheConfig,
    entries: HashMap<ResourceKey, CacheEntry<V>>,
    access_clock: u64,
}

impl<V> TtlCache<V> {
    /// Create a new store with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            access_clock: 0,
        }
    }

    /// Create a store with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Number of entries currently held (fresh and not-yet-swept alike)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configuration the store was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a key, updating recency on a hit
    ///
    /// An entry older than `max_age` is removed on sight and reported as
    /// [`Lookup::Expired`]; the caller sees a miss either way.
    pub fn get(&mut self, key: &ResourceKey) -> Lookup<V> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(entry) => {
                if now.duration_since(entry.created_at) > self.config.max_age {
                    self.entries.remove(key);
                    return Lookup::Expired;
                }
                self.access_clock += 1;
                entry.last_accessed = now;
                entry.access_seq = self.access_clock;
                entry.access_count += 1;
                Lookup::Hit(Arc::clone(&entry.value))
            }
            None => Lookup::Miss,
        }
    }

    /// Insert or overwrite a value, returning the keys evicted to stay
    /// within `max_entries`
    ///
    /// Overwriting resets `created_at` (the refresh semantics) and restarts
    /// the entry's access bookkeeping. Eviction removes entries in ascending
    /// recency order until the bound is satisfied; the new entry carries the
    /// freshest recency stamp, so it is never its own victim.
    pub fn insert(&mut self, key: ResourceKey, value: Arc<V>) -> Vec<ResourceKey> {
        let now = Instant::now();
        self.access_clock += 1;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_accessed: now,
                access_seq: self.access_clock,
                access_count: 0,
            },
        );

        let mut evicted = Vec::new();
        while self.entries.len() > self.config.max_entries {
            // Linear scan: max_entries is small by design (default 10)
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_seq)
                .map(|(key, _)| key.clone());
            match victim {
                Some(victim) => {
                    self.entries.remove(&victim);
                    evicted.push(victim);
                }
                None => break,
            }
        }
        evicted
    }

    /// Remove one entry, returning whether it existed
    pub fn invalidate(&mut self, key: &ResourceKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove all entries, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Remove every entry older than `max_age`, returning the expired keys
    pub fn sweep(&mut self) -> Vec<ResourceKey> {
        let now = Instant::now();
        let max_age = self.config.max_age;
        let expired: Vec<ResourceKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) > max_age)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    /// True if a fresh entry exists; does not touch recency
    pub fn contains_fresh(&self, key: &ResourceKey) -> bool {
        match self.entries.get(key) {
            Some(entry) => Instant::now().duration_since(entry.created_at) <= self.config.max_age,
            None => false,
        }
    }

    /// Metadata for one entry, fresh or not; does not touch recency
    pub fn entry_info(&self, key: &ResourceKey) -> Option<EntryInfo> {
        let now = Instant::now();
        self.entries.get(key).map(|entry| EntryInfo {
            key: key.clone(),
            age: now.duration_since(entry.created_at),
            idle: now.duration_since(entry.last_accessed),
            access_count: entry.access_count,
        })
    }

    /// Keys currently held, in no particular order
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.entries.keys().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::new(s)
    }

    fn cache(max_age_ms: u64, max_entries: usize) -> TtlCache<u32> {
        TtlCache::new(CacheConfig {
            max_age: Duration::from_millis(max_age_ms),
            max_entries,
        })
    }

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_age, Duration::from_secs(300));
        assert_eq!(config.max_entries, 10);
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = cache(10_000, 10);
        assert!(cache.is_empty());

        let evicted = cache.insert(key("a"), Arc::new(42));
        assert!(evicted.is_empty());
        assert_eq!(cache.len(), 1);

        match cache.get(&key("a")) {
            Lookup::Hit(value) => assert_eq!(*value, 42),
            other => panic!("expected hit, got {other:?}"),
        }
        assert!(matches!(cache.get(&key("missing")), Lookup::Miss));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let mut cache = cache(10_000, 10);
        cache.insert(key("a"), Arc::new(1));
        cache.insert(key("a"), Arc::new(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("a")).value(), Some(Arc::new(2)));
    }

    #[test]
    fn test_lru_eviction_order() {
        // Scenario: A and B cached, A re-accessed, C inserted -> B evicted
        let mut cache = cache(10_000, 2);
        cache.insert(key("a"), Arc::new(1));
        cache.insert(key("b"), Arc::new(2));

        assert!(cache.get(&key("a")).is_hit());

        let evicted = cache.insert(key("c"), Arc::new(3));
        assert_eq!(evicted, vec![key("b")]);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains_fresh(&key("a")));
        assert!(cache.contains_fresh(&key("c")));
        assert!(!cache.contains_fresh(&key("b")));
    }

    #[test]
    fn test_eviction_prefers_least_recent_insert_when_never_read() {
        let mut cache = cache(10_000, 2);
        cache.insert(key("a"), Arc::new(1));
        cache.insert(key("b"), Arc::new(2));
        let evicted = cache.insert(key("c"), Arc::new(3));
        assert_eq!(evicted, vec![key("a")]);
    }

    #[tokio::test]
    async fn test_ttl_expiry_on_get() {
        let mut cache = cache(50, 10);
        cache.insert(key("k"), Arc::new(7));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(matches!(cache.get(&key("k")), Lookup::Expired));
        // The expired entry was removed on sight
        assert!(cache.is_empty());
        assert!(matches!(cache.get(&key("k")), Lookup::Miss));
    }

    #[tokio::test]
    async fn test_access_does_not_extend_ttl() {
        let mut cache = cache(100, 10);
        cache.insert(key("k"), Arc::new(7));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get(&key("k")).is_hit());

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Age is measured from creation, not last access
        assert!(matches!(cache.get(&key("k")), Lookup::Expired));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let mut cache = cache(60, 10);
        cache.insert(key("old"), Arc::new(1));
        tokio::time::sleep(Duration::from_millis(90)).await;
        cache.insert(key("new"), Arc::new(2));

        let expired = cache.sweep();
        assert_eq!(expired, vec![key("old")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_fresh(&key("new")));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = cache(10_000, 10);
        cache.insert(key("a"), Arc::new(1));
        cache.insert(key("b"), Arc::new(2));

        assert!(cache.invalidate(&key("a")));
        assert!(!cache.invalidate(&key("a")));
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_info_tracks_access_count() {
        let mut cache = cache(10_000, 10);
        cache.insert(key("a"), Arc::new(1));

        let info = cache.entry_info(&key("a")).unwrap();
        assert_eq!(info.access_count, 0);

        cache.get(&key("a"));
        cache.get(&key("a"));

        let info = cache.entry_info(&key("a")).unwrap();
        assert_eq!(info.access_count, 2);
        assert!(cache.entry_info(&key("zzz")).is_none());
    }
}
