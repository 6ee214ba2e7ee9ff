//! Bounded LRU memoization for HyDE query expansion (§4.9, §5).
//!
//! Internally synchronized so callers can share one cache across
//! concurrent retrieval requests without coordinating a lock themselves.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// Caches `query text -> hypothetical document text` produced by a
/// `CompletionEngine`. Expansion is deterministic given the same query and
/// model, so memoizing is safe.
pub struct HydeCache {
    inner: Mutex<LruCache<String, String>>,
}

impl HydeCache {
    /// `capacity` of 0 degenerates to a cache that never retains anything,
    /// matching `NonZeroUsize`'s floor of 1 by always missing on lookup.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, query: &str) -> Option<String> {
        self.inner.lock().expect("hyde cache lock poisoned").get(query).cloned()
    }

    pub fn put(&self, query: impl Into<String>, hypothetical: impl Into<String>) {
        self.inner
            .lock()
            .expect("hyde cache lock poisoned")
            .put(query.into(), hypothetical.into());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("hyde cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = HydeCache::new(4);
        cache.put("what is rust", "Rust is a systems programming language.");
        assert_eq!(
            cache.get("what is rust"),
            Some("Rust is a systems programming language.".to_string())
        );
    }

    #[test]
    fn miss_returns_none() {
        let cache = HydeCache::new(4);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let cache = HydeCache::new(2);
        cache.put("a", "a-doc");
        cache.put("b", "b-doc");
        cache.put("c", "c-doc");
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }
}
