//! LRU cache for embedding results.
//!
//! Avoids re-embedding texts a provider has already seen. One cache wraps
//! exactly one provider, so vectors from different models never mix.

use crate::embedder::EmbeddingProvider;
use crate::error::ProviderError;
use crate::vector::Vector;
use ahash::{AHashMap, RandomState};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe LRU map from input text to embedding.
pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Vector, RandomState>>,
}

impl EmbeddingCache {
    /// A zero capacity is raised to one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::with_hasher(capacity, RandomState::new())),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vector> {
        self.inner.lock().get(text).cloned()
    }

    pub fn put(&self, text: String, vector: Vector) {
        self.inner.lock().put(text, vector);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Provider wrapper that serves repeated texts from an [`EmbeddingCache`].
pub struct CachedProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for CachedProvider {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, ProviderError> {
        let mut out: Vec<Option<Vector>> = texts.iter().map(|t| self.cache.get(t)).collect();

        let mut missing: Vec<String> = Vec::new();
        for (text, slot) in texts.iter().zip(out.iter()) {
            if slot.is_none() && !missing.contains(text) {
                missing.push(text.clone());
            }
        }

        let hit_count = out.iter().filter(|v| v.is_some()).count() as u64;
        self.hits.fetch_add(hit_count, Ordering::Relaxed);
        self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);

        if !missing.is_empty() {
            let fresh = self.inner.embed_batch(&missing).await?;
            if fresh.len() != missing.len() {
                return Err(ProviderError::Malformed(format!(
                    "expected {} embeddings, got {}",
                    missing.len(),
                    fresh.len()
                )));
            }

            let fetched: AHashMap<&String, &Vector> = missing.iter().zip(fresh.iter()).collect();
            for (text, slot) in texts.iter().zip(out.iter_mut()) {
                if slot.is_none() {
                    *slot = fetched.get(text).map(|v| (*v).clone());
                }
            }
            for (text, vector) in missing.into_iter().zip(fresh.into_iter()) {
                self.cache.put(text, vector);
            }
        }

        out.into_iter()
            .map(|v| v.ok_or_else(|| ProviderError::Malformed("embedding missing from batch".into())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::LocalModel;

    #[test]
    fn test_cache_hit_and_miss() {
        let cache = EmbeddingCache::new(10);
        assert!(cache.get("hello").is_none());

        cache.put("hello".into(), Vector::new(vec![1.0, 2.0]));
        assert_eq!(cache.get("hello"), Some(Vector::new(vec![1.0, 2.0])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        cache.put("a".into(), Vector::new(vec![1.0]));
        cache.put("b".into(), Vector::new(vec![2.0]));

        // Touch "a" so "b" becomes the oldest
        assert!(cache.get("a").is_some());
        cache.put("c".into(), Vector::new(vec![3.0]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_keeps_latest_entry() {
        let cache = EmbeddingCache::new(0);
        cache.put("a".into(), Vector::new(vec![1.0]));
        cache.put("b".into(), Vector::new(vec![2.0]));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cached_provider_matches_inner() {
        let local = Arc::new(LocalModel::new("m", 32));
        let cached = CachedProvider::new(local.clone(), 100);

        let texts = vec!["great acting".to_string(), "boring".to_string(), "great acting".to_string()];
        let first = cached.embed_batch(&texts).await.unwrap();
        let second = cached.embed_batch(&texts).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], local.embed_text("great acting"));
        assert_eq!(first[0], first[2]);

        let (hits, misses) = cached.stats();
        assert_eq!(misses, 2);
        assert_eq!(hits, 3);
    }
}
