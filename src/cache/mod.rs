//! Short-lived result cache
//!
//! Entries carry an absolute expiry instant and are evicted lazily: a read
//! that finds an expired entry removes it and reports a miss. There is no
//! background sweep.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    counters: CacheCounters,
}

/// Thread-safe string-keyed TTL cache
pub struct TtlCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                counters: CacheCounters::default(),
            })),
        }
    }

    /// Store a value for `ttl`; a zero TTL stores nothing
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let key = key.into();
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.entries.insert(
                    key,
                    CacheEntry {
                        value,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            Err(_) => warn!(key = %key, "Cache lock poisoned, entry not stored"),
        }
    }

    pub fn insert_secs(&self, key: impl Into<String>, value: V, ttl_secs: u64) {
        self.insert(key, value, Duration::from_secs(ttl_secs));
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;

        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let value = entry.value.clone();
                inner.counters.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            inner.counters.expired += 1;
            debug!(key, "Evicted expired cache entry");
        }
        inner.counters.misses += 1;
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner
            .lock()
            .ok()?
            .entries
            .remove(key)
            .map(|entry| entry.value)
    }

    /// Number of stored entries, expired ones included until read
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> CacheCounters {
        self.inner.lock().map(|i| i.counters).unwrap_or_default()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable cache key from arbitrary parts
pub fn cache_key(parts: &[&str]) -> String {
    use std::collections::hash_map::DefaultHasher;

    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = TtlCache::new();
        cache.insert_secs("status:line-4", "running".to_string(), 60);

        assert_eq!(cache.get("status:line-4").as_deref(), Some("running"));
        assert_eq!(cache.get("status:line-5"), None);

        let counters = cache.counters();
        assert_eq!(counters.hits, 1);
        assert_eq!(counters.misses, 1);
    }

    #[test]
    fn test_expired_read_evicts() {
        let cache = TtlCache::new();
        cache.insert("quote", 42u32, Duration::from_millis(50));
        assert_eq!(cache.len(), 1);

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(cache.get_at("quote", later), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.counters().expired, 1);
    }

    #[test]
    fn test_zero_ttl_is_not_stored() {
        let cache = TtlCache::new();
        cache.insert_secs("k", 1, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = TtlCache::new();
        let other = cache.clone();
        cache.insert_secs("k", 7, 30);
        assert_eq!(other.get("k"), Some(7));
        assert_eq!(other.remove("k"), Some(7));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_poisoned_lock_skips_insert() {
        let cache: TtlCache<u32> = TtlCache::new();
        let inner = Arc::clone(&cache.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        cache.insert_secs("k", 1, 30);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        assert_eq!(cache_key(&["openai", "hi"]), cache_key(&["openai", "hi"]));
        assert_ne!(cache_key(&["openai", "hi"]), cache_key(&["groq", "hi"]));
    }
}
