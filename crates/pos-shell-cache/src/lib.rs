//! # pos-shell-cache
//!
//! Versioned, cache-first resource cache that keeps the POS application
//! shell loadable with zero connectivity.
//!
//! ## Features
//!
//! - **Generations**: one cache per deployed version, older ones deleted on activation
//! - **Cache First**: cached shell resources never touch the network
//! - **Write-Through**: same-origin, non-API responses are cached on first fetch
//! - **Offline Fallback**: navigations fall back to the cached entry point
//!
//! ## Example
//!
//! ```rust,ignore
//! use pos_shell_cache::{FetchRequest, ShellCacheManager, ShellConfig};
//!
//! let config = ShellConfig::load_default();
//! let manager = ShellCacheManager::from_config(&config).await?;
//! manager.install().await?;
//!
//! let response = manager
//!     .handle_fetch(&FetchRequest::navigate("http://localhost:8080/pages/sales.html"))
//!     .await;
//! ```

pub mod config;
pub mod fetcher;
pub mod manager;
pub mod response;
pub mod storage;

pub use config::{CacheBackend, ShellConfig, ShellManifest};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use manager::{FetchStats, InstallReport, LifecycleState, ShellCacheManager};
pub use response::{CachedResponse, FetchRequest, RequestMode};
pub use storage::memory::MemoryCacheStorage;
pub use storage::CacheStorage;

#[cfg(feature = "filesystem")]
pub use storage::filesystem::FilesystemCacheStorage;
