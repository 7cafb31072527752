// File: pos-shell-cache/src/manager.rs
// Purpose: Install, activate and fetch interception for versioned shell caches

use anyhow::{Context, Result};
use chrono::Utc;
use pos_sync::messages::{ClientMessage, WorkerMessage, SYNC_TAG};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use url::Url;

use crate::config::{resolve, CacheBackend, ShellConfig, ShellManifest};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::response::{CachedResponse, FetchRequest};
use crate::storage::memory::MemoryCacheStorage;
use crate::storage::CacheStorage;

/// Where the manager is in its install/activate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Registered,
    Installing,
    WaitingToActivate,
    Activated,
}

/// Result of populating a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    /// Resolved URLs stored in the generation
    pub cached: Vec<String>,
    /// Resolved URLs that could not be stored, with the reason
    pub failed: Vec<(String, String)>,
    /// Another generation of this application existed at install time
    pub replaces_previous: bool,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch interception counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Served from the current generation
    pub hits: u64,
    /// Not cached, went to the network
    pub misses: u64,
    /// Network responses written through to the cache
    pub writes: u64,
    /// Failed navigations answered with the entry point
    pub fallbacks: u64,
    /// Synthetic unavailable responses
    pub unavailable: u64,
}

/// Keeps the application shell loadable without connectivity
///
/// Cheap to clone; clones share lifecycle, counters and client channel.
#[derive(Clone)]
pub struct ShellCacheManager {
    manifest: Arc<ShellManifest>,
    scope: Url,
    skip_waiting: bool,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: Arc<RwLock<LifecycleState>>,
    stats: Arc<RwLock<FetchStats>>,
    clients: broadcast::Sender<ClientMessage>,
}

impl ShellCacheManager {
    pub fn new(
        config: &ShellConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let scope = config
            .scope_url()
            .with_context(|| format!("Invalid cache scope: {}", config.scope))?;
        let (clients, _) = broadcast::channel(32);

        tracing::info!(
            cache = %config.manifest.cache_name(),
            %scope,
            storage = storage.name(),
            "Shell cache manager registered"
        );

        Ok(Self {
            manifest: Arc::new(config.manifest.clone()),
            scope,
            skip_waiting: config.skip_waiting,
            storage,
            fetcher,
            state: Arc::new(RwLock::new(LifecycleState::Registered)),
            stats: Arc::new(RwLock::new(FetchStats::default())),
            clients,
        })
    }

    /// Build a manager with the storage backend from `config` and an HTTP fetcher
    pub async fn from_config(config: &ShellConfig) -> Result<Self> {
        let storage = Self::create_storage(&config.storage).await?;
        let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30))?);
        Self::new(config, storage, fetcher)
    }

    async fn create_storage(backend: &CacheBackend) -> Result<Arc<dyn CacheStorage>> {
        match backend {
            CacheBackend::Memory => Ok(Arc::new(MemoryCacheStorage::new())),
            #[cfg(feature = "filesystem")]
            CacheBackend::Filesystem { path } => {
                use crate::storage::filesystem::FilesystemCacheStorage;
                Ok(Arc::new(FilesystemCacheStorage::new(path).await?))
            }
            #[cfg(not(feature = "filesystem"))]
            CacheBackend::Filesystem { .. } => {
                anyhow::bail!("Filesystem cache storage requires the 'filesystem' feature")
            }
        }
    }

    pub fn cache_name(&self) -> String {
        self.manifest.cache_name()
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn stats(&self) -> FetchStats {
        self.stats.read().await.clone()
    }

    /// Messages for open application instances
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.clients.subscribe()
    }

    fn post(&self, message: ClientMessage) {
        // No open clients is fine
        let _ = self.clients.send(message);
    }

    /// Populate the current generation from the manifest
    ///
    /// Unreachable resources are reported, not fatal. Only a storage failure
    /// aborts the install.
    pub async fn install(&self) -> Result<InstallReport> {
        *self.state.write().await = LifecycleState::Installing;
        let cache_name = self.cache_name();
        tracing::info!(cache = %cache_name, "Installing shell cache");

        let replaces_previous = self
            .storage
            .cache_names()
            .await?
            .iter()
            .any(|name| *name != cache_name && self.manifest.owns_cache(name));

        let mut report = InstallReport {
            cache_name: cache_name.clone(),
            cached: Vec::new(),
            failed: Vec::new(),
            replaces_previous,
        };

        for resource in &self.manifest.resources {
            let url = match resolve(&self.scope, resource) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    report.failed.push((resource.clone(), e.to_string()));
                    continue;
                }
            };

            match self.fetcher.fetch(&FetchRequest::get(url.clone())).await {
                Ok(response) if response.is_success() => {
                    self.storage.put(&cache_name, &url, response).await?;
                    report.cached.push(url);
                }
                Ok(response) => {
                    report
                        .failed
                        .push((url, format!("{} {}", response.status, response.status_text)));
                }
                Err(e) => report.failed.push((url, e.to_string())),
            }
        }

        if !report.is_complete() {
            tracing::warn!(
                failed = report.failed.len(),
                cached = report.cached.len(),
                "Some files failed to cache, continuing"
            );
        }
        tracing::info!(cache = %cache_name, cached = report.cached.len(), "Installation complete");

        *self.state.write().await = LifecycleState::WaitingToActivate;

        if replaces_previous {
            self.post(ClientMessage::UpdateAvailable {
                cache_name: cache_name.clone(),
            });
        }

        if self.skip_waiting {
            self.activate().await?;
        }

        Ok(report)
    }

    /// Delete every other cache and take control of clients
    ///
    /// Returns the deleted cache names. Activating again is a no-op.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let previous = self.state().await;
        if matches!(
            previous,
            LifecycleState::Registered | LifecycleState::Installing
        ) {
            anyhow::bail!("Cannot activate before install completes (state: {:?})", previous);
        }

        let cache_name = self.cache_name();
        let mut deleted = Vec::new();
        for name in self.storage.cache_names().await? {
            if name != cache_name && self.storage.delete_cache(&name).await? {
                tracing::info!(cache = %name, "Cleared old cache");
                deleted.push(name);
            }
        }

        *self.state.write().await = LifecycleState::Activated;

        if previous == LifecycleState::WaitingToActivate {
            tracing::info!(cache = %cache_name, "Activated and ready for offline use");
            self.post(ClientMessage::ControllerChanged { cache_name });
        }

        Ok(deleted)
    }

    /// Handle a message posted by the application
    pub async fn handle_message(&self, message: WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::SkipWaiting => {
                if self.state().await == LifecycleState::WaitingToActivate {
                    self.activate().await?;
                } else {
                    tracing::debug!("Skip waiting ignored, nothing is waiting");
                }
            }
        }
        Ok(())
    }

    /// Answer an intercepted request. Never fails.
    ///
    /// Cache first for GET; other methods always go to the network. On a miss
    /// the network response is written through for same-origin non-API
    /// resources. When the network is unreachable a navigation gets the cached
    /// entry point and anything else a synthetic 503.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> CachedResponse {
        let cache_name = self.cache_name();

        let url = match Url::parse(&request.url).or_else(|_| resolve(&self.scope, &request.url)) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Unparseable request URL");
                self.stats.write().await.unavailable += 1;
                return CachedResponse::unavailable(request.url.clone());
            }
        };
        let key = url.to_string();

        if request.is_get() {
            match self.storage.get(&cache_name, &key).await {
                Ok(Some(cached)) => {
                    self.stats.write().await.hits += 1;
                    return cached;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(%key, error = %e, "Cache read failed, trying network"),
            }
        }
        self.stats.write().await.misses += 1;

        let network_request = FetchRequest {
            url: key.clone(),
            ..request.clone()
        };
        match self.fetcher.fetch(&network_request).await {
            Ok(response) => {
                if self.should_write_through(&url, request, &response) {
                    match self.storage.put(&cache_name, &key, response.clone()).await {
                        Ok(()) => self.stats.write().await.writes += 1,
                        Err(e) => tracing::warn!(%key, error = %e, "Failed to cache response"),
                    }
                }
                response
            }
            Err(e) => {
                tracing::info!(%key, error = %e, "Fetch failed, using offline fallback");
                self.offline_fallback(request, &cache_name).await
            }
        }
    }

    async fn offline_fallback(&self, request: &FetchRequest, cache_name: &str) -> CachedResponse {
        if request.is_navigation() {
            if let Ok(entry) = resolve(&self.scope, &self.manifest.entry_point) {
                if let Ok(Some(shell)) = self.storage.get(cache_name, entry.as_str()).await {
                    self.stats.write().await.fallbacks += 1;
                    return shell;
                }
            }
        }

        self.stats.write().await.unavailable += 1;
        CachedResponse::unavailable(request.url.clone())
    }

    fn should_write_through(&self, url: &Url, request: &FetchRequest, response: &CachedResponse) -> bool {
        request.is_get()
            && response.is_success()
            && url.origin() == self.scope.origin()
            && !url.path().contains("/api/")
    }

    /// Background sync event; `sync-data` asks every client to drain its queue
    pub fn background_sync(&self, tag: &str) -> bool {
        if tag != SYNC_TAG {
            tracing::debug!(%tag, "Ignoring unknown background sync tag");
            return false;
        }

        tracing::info!("Background sync triggered, notifying clients");
        self.post(ClientMessage::SyncRequested {
            timestamp: Utc::now(),
        });
        true
    }
}
