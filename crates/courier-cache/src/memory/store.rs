//! In-memory cache implementation using the moka crate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;

use courier_core::config::cache::MemoryCacheConfig;
use courier_core::result::AppResult;
use courier_core::traits::cache::CacheProvider;

/// In-memory cache provider using moka.
///
/// Moka evicts at the cache-level TTL; per-entry TTLs (which presence
/// records rely on, since heartbeats extend them) are tracked in a
/// side map of deadlines checked on every read.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    /// The underlying moka cache.
    cache: Cache<String, String>,
    /// Per-entry expiry deadlines.
    deadlines: Arc<DashMap<String, Instant>>,
    /// Default TTL for entries.
    default_ttl: Duration,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &MemoryCacheConfig, default_ttl_seconds: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.time_to_live_seconds))
            .build();

        Self {
            cache,
            deadlines: Arc::new(DashMap::new()),
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    /// Whether the entry for `key` is past its deadline.
    fn is_expired(&self, key: &str) -> bool {
        match self.deadlines.get(key) {
            Some(deadline) => *deadline < Instant::now(),
            None => false,
        }
    }

    async fn evict(&self, key: &str) {
        self.cache.remove(key).await;
        self.deadlines.remove(key);
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        if self.is_expired(key) {
            self.evict(key).await;
            return Ok(None);
        }
        Ok(self.cache.get(key).await)
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            result.push(self.get(key).await?);
        }
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.cache.insert(key.to_string(), value.to_string()).await;
        self.deadlines
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn set_default(&self, key: &str, value: &str) -> AppResult<()> {
        self.set(key, value, self.default_ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.evict(key).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        if self.is_expired(key) {
            self.evict(key).await;
            return Ok(false);
        }
        Ok(self.cache.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if self.is_expired(key) {
            self.evict(key).await;
            return Ok(false);
        }
        if !self.cache.contains_key(key) {
            return Ok(false);
        }
        self.deadlines
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn flush_all(&self) -> AppResult<()> {
        self.cache.invalidate_all();
        self.deadlines.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider() -> MemoryCacheProvider {
        let config = MemoryCacheConfig {
            max_capacity: 1000,
            time_to_live_seconds: 60,
        };
        MemoryCacheProvider::new(&config, 60)
    }

    #[tokio::test]
    async fn test_set_get() {
        let provider = make_provider();
        provider
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();
        let val = provider.get("key1").await.unwrap();
        assert_eq!(val, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_delete() {
        let provider = make_provider();
        provider
            .set("key2", "value2", Duration::from_secs(60))
            .await
            .unwrap();
        provider.delete("key2").await.unwrap();
        let val = provider.get("key2").await.unwrap();
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let provider = make_provider();
        provider
            .set("short", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(provider.get("short").await.unwrap(), None);
        assert!(!provider.exists("short").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_extends_deadline() {
        let provider = make_provider();
        provider
            .set("hb", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(provider
            .expire("hb", Duration::from_secs(60))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(provider.get("hb").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_expire_absent_key_is_false() {
        let provider = make_provider();
        assert!(!provider
            .expire("missing", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_get_many_preserves_order() {
        let provider = make_provider();
        provider
            .set("a", "1", Duration::from_secs(60))
            .await
            .unwrap();
        provider
            .set("c", "3", Duration::from_secs(60))
            .await
            .unwrap();

        let result = provider
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(
            result,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let provider = make_provider();
        let data = serde_json::json!({"name": "test", "count": 42});
        provider
            .set_json("json_key", &data, Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<serde_json::Value> = provider.get_json("json_key").await.unwrap();
        assert_eq!(result, Some(data));
    }
}
