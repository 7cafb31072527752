// Integration tests for the shell cache manager against a simulated network

use async_trait::async_trait;
use pos_shell_cache::{
    CacheStorage, CachedResponse, FetchError, FetchRequest, Fetcher, LifecycleState,
    MemoryCacheStorage, ShellCacheManager, ShellConfig,
};
use pos_sync::ClientMessage;
use pretty_assertions::{assert_eq, assert_ne};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SCOPE: &str = "https://shop.example.com/pos/";

/// Serves a page per URL, or fails every request while offline
#[derive(Default)]
struct SimulatedNetwork {
    offline: AtomicBool,
    missing: Mutex<HashSet<String>>,
    requests: AtomicUsize,
}

impl SimulatedNetwork {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn mark_missing(&self, url: &str) {
        self.missing.lock().unwrap().insert(url.to_string());
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for SimulatedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable("simulated outage".into()));
        }
        if self.missing.lock().unwrap().contains(&request.url) {
            return Ok(CachedResponse::new(request.url.clone(), 404, "Not Found"));
        }
        Ok(CachedResponse::ok(
            request.url.clone(),
            "text/html",
            format!("body of {}", request.url),
        ))
    }
}

fn config(version: &str) -> ShellConfig {
    let mut config = ShellConfig {
        scope: SCOPE.into(),
        ..ShellConfig::default()
    };
    config.manifest.version = version.into();
    config
}

fn manager(
    version: &str,
    storage: Arc<MemoryCacheStorage>,
    network: Arc<SimulatedNetwork>,
) -> ShellCacheManager {
    ShellCacheManager::new(&config(version), storage, network).unwrap()
}

#[tokio::test]
async fn test_cached_asset_served_while_network_fails() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = Arc::new(SimulatedNetwork::default());
    let manager = manager("v1", storage.clone(), network.clone());
    manager.install().await.unwrap();

    let url = format!("{}assets/js/sync.js", SCOPE);
    let stored = storage.get("pos-system-v1", &url).await.unwrap().unwrap();

    network.set_offline(true);
    let before = network.requests();
    let response = manager.handle_fetch(&FetchRequest::get(url)).await;

    assert_eq!(response, stored);
    assert_eq!(network.requests(), before);
    assert_eq!(manager.stats().await.hits, 1);
}

#[tokio::test]
async fn test_failed_navigation_falls_back_to_entry_point() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = Arc::new(SimulatedNetwork::default());
    let manager = manager("v1", storage.clone(), network.clone());
    manager.install().await.unwrap();
    network.set_offline(true);

    let response = manager
        .handle_fetch(&FetchRequest::navigate(format!("{}pages/unknown.html", SCOPE)))
        .await;

    let entry = storage
        .get("pos-system-v1", &format!("{}index.html", SCOPE))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, entry);
    assert_eq!(manager.stats().await.fallbacks, 1);
}

#[tokio::test]
async fn test_uncached_resource_offline_is_synthetic_503() {
    let network = Arc::new(SimulatedNetwork::default());
    network.set_offline(true);
    let manager = manager("v1", Arc::new(MemoryCacheStorage::new()), network);

    // Nothing installed: navigation has no shell to fall back to either
    for request in [
        FetchRequest::get(format!("{}assets/img/logo.png", SCOPE)),
        FetchRequest::navigate(SCOPE),
    ] {
        let response = manager.handle_fetch(&request).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.status_text, "Service Unavailable");
        assert_eq!(response.text(), "Offline - content not available");
    }
    assert_eq!(manager.stats().await.unavailable, 2);
}

#[tokio::test]
async fn test_partial_install_is_not_fatal() {
    let network = Arc::new(SimulatedNetwork::default());
    let missing = format!("{}pages/wallet.html", SCOPE);
    network.mark_missing(&missing);
    let manager = manager("v1", Arc::new(MemoryCacheStorage::new()), network);

    let report = manager.install().await.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, missing);
    assert_eq!(manager.state().await, LifecycleState::Activated);
}

#[tokio::test]
async fn test_new_generation_replaces_old_on_activation() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = Arc::new(SimulatedNetwork::default());

    manager("v1", storage.clone(), network.clone())
        .install()
        .await
        .unwrap();
    // Unrelated caches are removed too
    storage
        .put("scratch", "k", CachedResponse::ok("k", "text/plain", "x"))
        .await
        .unwrap();

    let mut next_config = config("v2");
    next_config.skip_waiting = false;
    let next = ShellCacheManager::new(&next_config, storage.clone(), network).unwrap();
    let mut clients = next.subscribe();

    let report = next.install().await.unwrap();
    assert!(report.replaces_previous);
    assert_eq!(
        clients.try_recv().unwrap(),
        ClientMessage::UpdateAvailable {
            cache_name: "pos-system-v2".into()
        }
    );
    assert_eq!(storage.cache_names().await.unwrap().len(), 3);

    let mut deleted = next.activate().await.unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["pos-system-v1".to_string(), "scratch".to_string()]);
    assert_eq!(
        storage.cache_names().await.unwrap(),
        vec!["pos-system-v2".to_string()]
    );
    assert_eq!(
        clients.try_recv().unwrap(),
        ClientMessage::ControllerChanged {
            cache_name: "pos-system-v2".into()
        }
    );

    // Activating the same generation again changes nothing
    assert!(next.activate().await.unwrap().is_empty());
    assert!(clients.try_recv().is_err());
    assert_eq!(
        storage.cache_names().await.unwrap(),
        vec!["pos-system-v2".to_string()]
    );
}

#[tokio::test]
async fn test_miss_is_written_through_and_then_served_offline() {
    let network = Arc::new(SimulatedNetwork::default());
    let manager = manager("v1", Arc::new(MemoryCacheStorage::new()), network.clone());
    let request = FetchRequest::get(format!("{}assets/img/receipt.svg", SCOPE));

    let first = manager.handle_fetch(&request).await;
    assert!(first.is_success());

    network.set_offline(true);
    let second = manager.handle_fetch(&request).await;
    assert_eq!(second, first);

    let stats = manager.stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.writes, 1);
}

#[tokio::test]
async fn test_non_get_request_bypasses_cache() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let network = Arc::new(SimulatedNetwork::default());
    let manager = manager("v1", storage.clone(), network.clone());
    manager.install().await.unwrap();

    let url = format!("{}pages/settings.html", SCOPE);
    let cached = storage.get("pos-system-v1", &url).await.unwrap().unwrap();

    let before = network.requests();
    let post = FetchRequest::get(url.clone()).with_method("POST");
    let response = manager.handle_fetch(&post).await;
    assert!(response.is_success());
    assert_eq!(network.requests(), before + 1);

    // Not answered from the cache while offline either
    network.set_offline(true);
    let offline = manager.handle_fetch(&post).await;
    assert_eq!(offline.status, 503);
    assert_ne!(offline, cached);

    let stats = manager.stats().await;
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.writes, 0);
    assert_eq!(storage.get("pos-system-v1", &url).await.unwrap(), Some(cached));
}
