//! Storage backends for cache generations

use crate::response::CachedResponse;
use anyhow::Result;
use async_trait::async_trait;

pub mod memory;

#[cfg(feature = "filesystem")]
pub mod filesystem;

/// Named caches of URL -> response
///
/// Writes to one key are atomic; concurrent writes to the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Get a cached response from `cache`
    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>>;

    /// Store a response, creating `cache` if needed
    async fn put(&self, cache: &str, key: &str, response: CachedResponse) -> Result<()>;

    /// Delete a whole cache; returns whether it existed
    async fn delete_cache(&self, cache: &str) -> Result<bool>;

    /// Names of all existing caches
    async fn cache_names(&self) -> Result<Vec<String>>;

    /// Keys stored in `cache`
    async fn keys(&self, cache: &str) -> Result<Vec<String>>;

    /// Get storage backend name
    fn name(&self) -> &'static str;
}
