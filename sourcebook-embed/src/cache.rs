//! Bounded content-addressed cache for generated embeddings.
//!
//! Embedding the same text twice always yields the same vector, so re-running
//! the model for repeated content is pure waste. This cache keys finished
//! embeddings by the BLAKE3 hash of the input text and evicts the oldest entry
//! once the configured capacity is reached (FIFO). Capacity is counted in
//! entries, not bytes.
//!
//! The cache is internally synchronized and safe to share behind an `Arc`.

use half::f16;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Cache key: BLAKE3 hash of the input text.
pub type ContentHash = [u8; 32];

/// Hash text into its cache key.
pub fn content_hash(text: &str) -> ContentHash {
    *blake3::hash(text.as_bytes()).as_bytes()
}

struct CacheInner {
    entries: HashMap<ContentHash, Vec<f16>>,
    // Insertion order, oldest first.
    order: VecDeque<ContentHash>,
}

/// Bounded FIFO cache mapping text hashes to finished embedding vectors.
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` entries. A capacity of zero
    /// disables caching entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Look up a previously stored embedding.
    pub fn get(&self, hash: &ContentHash) -> Option<Vec<f16>> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(hash).cloned()
    }

    /// Store an embedding, evicting the oldest entry if the cache is full.
    /// Storing under an already-present hash is a no-op.
    pub fn insert(&self, hash: ContentHash, embedding: Vec<f16>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.contains_key(&hash) {
            return;
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.entries.insert(hash, embedding);
        inner.order.push_back(hash);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(seed: f32) -> Vec<f16> {
        vec![f16::from_f32(seed), f16::from_f32(seed * 2.0)]
    }

    #[test]
    fn content_hash_is_stable_and_distinct() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
    }

    #[test]
    fn get_returns_what_was_inserted() {
        let cache = EmbeddingCache::new(4);
        let hash = content_hash("hello");
        assert!(cache.get(&hash).is_none());
        cache.insert(hash, vector(1.0));
        assert_eq!(cache.get(&hash), Some(vector(1.0)));
    }

    #[test]
    fn insert_is_idempotent_per_hash() {
        let cache = EmbeddingCache::new(4);
        let hash = content_hash("hello");
        cache.insert(hash, vector(1.0));
        cache.insert(hash, vector(9.0));
        assert_eq!(cache.get(&hash), Some(vector(1.0)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_bound_evicts_oldest_first() {
        let cache = EmbeddingCache::new(2);
        let a = content_hash("a");
        let b = content_hash("b");
        let c = content_hash("c");
        cache.insert(a, vector(1.0));
        cache.insert(b, vector(2.0));
        cache.insert(c, vector(3.0));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = EmbeddingCache::new(0);
        cache.insert(content_hash("a"), vector(1.0));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = EmbeddingCache::new(4);
        cache.insert(content_hash("a"), vector(1.0));
        cache.insert(content_hash("b"), vector(2.0));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&content_hash("a")).is_none());
    }
}
