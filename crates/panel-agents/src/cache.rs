//! Time-bounded cache in front of market data requests

use cached::{Cached, TimedCache};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Thread-safe TTL cache shared between clones
pub struct MarketCache<K, V> {
    cache: Arc<RwLock<TimedCache<K, V>>>,
}

impl<K, V> MarketCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    /// Create a new cache with specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        // Lookups evict expired entries, hence the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Return the cached value or run `fetcher` and cache its success
    ///
    /// Failures are passed through and never cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(key = ?key, "Cache hit");
            return Ok(value);
        }

        tracing::debug!(key = ?key, "Cache miss");
        let value = fetcher().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> Clone for MarketCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_get_or_fetch_caches_success() {
        let cache: MarketCache<String, u32> = MarketCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("AAPL".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let cache: MarketCache<String, u32> = MarketCache::new(Duration::from_secs(60));

        let err = cache
            .get_or_fetch("MSFT".to_string(), || async { Err::<u32, _>("HTTP 429") })
            .await
            .unwrap_err();
        assert_eq!(err, "HTTP 429");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache: MarketCache<&'static str, u32> = MarketCache::new(Duration::from_secs(60));
        cache.insert("AAPL", 1).await;
        cache.insert("MSFT", 2).await;

        cache.invalidate(&"AAPL").await;
        assert_eq!(cache.get(&"AAPL").await, None);
        assert_eq!(cache.clone().get(&"MSFT").await, Some(2));

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
