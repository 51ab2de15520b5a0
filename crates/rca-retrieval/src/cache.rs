//! Content-addressed embedding cache using moka
//!
//! Shared across tasks. Keys are content fingerprints, so recomputing and
//! re-inserting the same embedding is harmless.

use crate::fingerprint::Fingerprint;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cache of query embeddings
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    inner: Cache<Fingerprint, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    /// Create cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get cached vector
    #[inline]
    pub async fn get(&self, key: &Fingerprint) -> Option<Arc<Vec<f32>>> {
        self.inner.get(key).await
    }

    /// Insert vector
    #[inline]
    pub async fn insert(&self, key: Fingerprint, vector: Arc<Vec<f32>>) {
        self.inner.insert(key, vector).await;
    }

    /// Return the cached vector or compute, cache, and return it
    ///
    /// Errors are returned as-is and never cached.
    pub async fn try_get_or_insert_with<E, F, Fut>(
        &self,
        key: Fingerprint,
        f: F,
    ) -> Result<Arc<Vec<f32>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<f32>, E>>,
    {
        if let Some(cached) = self.get(&key).await {
            return Ok(cached);
        }

        let vector = Arc::new(f().await?);
        self.insert(key, Arc::clone(&vector)).await;
        Ok(vector)
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Check if key is cached
    #[inline]
    pub async fn contains(&self, key: &Fingerprint) -> bool {
        self.inner.get(key).await.is_some()
    }
}

impl Default for EmbeddingCache {
    /// Create cache with default capacity (10,000 entries)
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn computes_once_per_fingerprint() {
        let cache = EmbeddingCache::new(100);
        let calls = AtomicUsize::new(0);

        for text in ["redis timeout", "  REDIS   timeout "] {
            let v = cache
                .try_get_or_insert_with::<(), _, _>(Fingerprint::of(text), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1.0, 0.0])
                })
                .await
                .unwrap();
            assert_eq!(*v, vec![1.0, 0.0]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = EmbeddingCache::new(100);
        let key = Fingerprint::of("flaky");

        let first: Result<_, &str> = cache
            .try_get_or_insert_with(key, || async { Err("provider down") })
            .await;
        assert!(first.is_err());
        assert!(!cache.contains(&key).await);

        let second: Result<_, &str> = cache
            .try_get_or_insert_with(key, || async { Ok(vec![0.5]) })
            .await;
        assert_eq!(*second.unwrap(), vec![0.5]);
        assert!(cache.contains(&key).await);
    }

    #[tokio::test]
    async fn invalidate_all_clears() {
        let cache = EmbeddingCache::default();
        let key = Fingerprint::of("x");
        cache.insert(key, Arc::new(vec![1.0])).await;
        assert!(cache.contains(&key).await);

        cache.invalidate_all();
        assert!(!cache.contains(&key).await);
    }
}
