//! TTL-bounded LRU cache over search results (spec §6 `search_cache`).
//! Grounded on the `lru` crate's capacity-bounded map, the same dependency
//! the teacher reaches for wherever it needs a bounded in-memory cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Hit/miss counters for the `/metrics` endpoint's cache hit rate (§4.10's
/// sibling ambient concern, observability).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct TtlCache<V: Clone> {
    inner: LruCache<String, Entry<V>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, ttl_seconds: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: LruCache::new(capacity), ttl: Duration::from_secs(ttl_seconds), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// Returns a cached value, evicting it first if it has expired.
    pub fn get(&mut self, key: &str) -> Option<V> {
        if let Some(entry) = self.inner.peek(key) {
            if entry.inserted_at.elapsed() > self.ttl {
                self.inner.pop(key);
            }
        }
        let value = self.inner.get(key).map(|e| e.value.clone());
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }

    pub fn put(&mut self, key: String, value: V) {
        self.inner.put(key, Entry { value, inserted_at: Instant::now() });
    }

    pub fn invalidate_prefix(&mut self, prefix: &str) {
        let stale: Vec<String> = self.inner.iter().filter(|(k, _)| k.starts_with(prefix)).map(|(k, _)| k.clone()).collect();
        for key in stale {
            self.inner.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn returns_value_within_ttl() {
        let mut cache: TtlCache<i32> = TtlCache::new(10, 60);
        cache.put("a".into(), 1);
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn expires_after_ttl() {
        let mut cache: TtlCache<i32> = TtlCache::new(10, 0);
        cache.put("a".into(), 1);
        sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn invalidate_prefix_drops_matching_keys_only() {
        let mut cache: TtlCache<i32> = TtlCache::new(10, 60);
        cache.put("search:pubmed:x".into(), 1);
        cache.put("search:other:y".into(), 2);
        cache.invalidate_prefix("search:pubmed:");
        assert_eq!(cache.get("search:pubmed:x"), None);
        assert_eq!(cache.get("search:other:y"), Some(2));
    }
}
