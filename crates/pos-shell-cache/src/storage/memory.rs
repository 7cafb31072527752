//! In-memory cache storage

use crate::response::CachedResponse;
use crate::storage::CacheStorage;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Generation = HashMap<String, CachedResponse>;

/// In-memory storage backend
///
/// Fast but non-persistent - caches are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<HashMap<String, Generation>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in one cache
    pub async fn size(&self, cache: &str) -> usize {
        self.caches
            .read()
            .await
            .get(cache)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>> {
        let caches = self.caches.read().await;
        Ok(caches.get(cache).and_then(|entries| entries.get(key)).cloned())
    }

    async fn put(&self, cache: &str, key: &str, response: CachedResponse) -> Result<()> {
        let mut caches = self.caches.write().await;
        caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        let mut caches = self.caches.write().await;
        Ok(caches.remove(cache).is_some())
    }

    async fn cache_names(&self) -> Result<Vec<String>> {
        let caches = self.caches.read().await;
        let mut names: Vec<String> = caches.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(cache)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
