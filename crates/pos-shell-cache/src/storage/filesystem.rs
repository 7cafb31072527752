//! Filesystem cache storage

use crate::response::CachedResponse;
use crate::storage::CacheStorage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const ENTRY_EXT: &str = ".json";

/// Filesystem storage backend
///
/// Each cache is a directory under the root and each entry a JSON file.
/// Names and keys are percent-encoded so any URL maps to a flat file name.
#[derive(Clone)]
pub struct FilesystemCacheStorage {
    root: PathBuf,
}

impl FilesystemCacheStorage {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .context("Failed to create cache directory")?;
        Ok(Self { root })
    }

    fn cache_dir(&self, cache: &str) -> PathBuf {
        self.root.join(urlencoding::encode(cache).as_ref())
    }

    fn entry_path(&self, cache: &str, key: &str) -> PathBuf {
        self.cache_dir(cache)
            .join(format!("{}{}", urlencoding::encode(key), ENTRY_EXT))
    }

    /// Each write stages into its own file; concurrent puts never collide
    fn temp_path(&self, cache: &str, key: &str) -> PathBuf {
        self.cache_dir(cache).join(format!(
            "{}.{}.tmp",
            urlencoding::encode(key),
            Uuid::new_v4().simple()
        ))
    }
}

#[async_trait]
impl CacheStorage for FilesystemCacheStorage {
    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(cache, key);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read cache entry"),
        };

        let response: CachedResponse =
            serde_json::from_str(&content).context("Failed to deserialize cache entry")?;
        Ok(Some(response))
    }

    async fn put(&self, cache: &str, key: &str, response: CachedResponse) -> Result<()> {
        fs::create_dir_all(self.cache_dir(cache))
            .await
            .context("Failed to create cache generation directory")?;

        let path = self.entry_path(cache, key);
        let tmp = self.temp_path(cache, key);
        let json = serde_json::to_vec(&response).context("Failed to serialize response")?;

        fs::write(&tmp, json)
            .await
            .context("Failed to write cache entry")?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e).context("Failed to commit cache entry");
        }
        Ok(())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool> {
        match fs::remove_dir_all(self.cache_dir(cache)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to delete cache generation"),
        }
    }

    async fn cache_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .context("Failed to list cache directory")?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let raw = entry.file_name().to_string_lossy().into_owned();
            if let Ok(name) = urlencoding::decode(&raw) {
                names.push(name.into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(self.cache_dir(cache)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to list cache generation"),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            // Leftover temp files from an interrupted write are not entries
            let Some(encoded) = file_name.strip_suffix(ENTRY_EXT) else {
                continue;
            };
            if let Ok(key) = urlencoding::decode(encoded) {
                keys.push(key.into_owned());
            }
        }

        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}
