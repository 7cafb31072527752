// File: pos-shell-cache/src/config.rs
// Purpose: Shell manifest and cache manager configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Cache manager configuration, read from `pos-shell.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    /// Deployment root the manifest resolves against; may be a sub-path
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Activate a freshly installed generation without waiting
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    #[serde(default)]
    pub storage: CacheBackend,

    #[serde(default)]
    pub manifest: ShellManifest,
}

/// Where cache generations live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,

    /// One directory per generation under `path`
    Filesystem { path: PathBuf },
}

/// Versioned list of application shell resources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellManifest {
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Bump on every deploy that changes the resource list
    #[serde(default = "default_version")]
    pub version: String,

    /// Served for navigations that fail while offline
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
}

fn default_scope() -> String {
    "http://localhost:8080/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_prefix() -> String {
    "pos-system".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_entry_point() -> String {
    "/index.html".to_string()
}

fn default_resources() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/pages/dashboard.html",
        "/pages/sales.html",
        "/pages/Inventory.html",
        "/pages/expenses.html",
        "/pages/wallet.html",
        "/pages/reports.html",
        "/pages/profile.html",
        "/pages/settings.html",
        "/pages/notifications.html",
        "/pages/transaction_history.html",
        "/assets/css/styles.css",
        "/assets/js/data.js",
        "/assets/js/sync.js",
        "/assets/js/script.js",
        "/assets/js/pwa.js",
        "/assets/js/theme_toggle.js",
        "/assets/js/calculations.js",
        "/assets/js/settings.js",
        "/assets/componets/sidebar.html",
        "/assets/componets/topbar.html",
        "/manifest.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            skip_waiting: true,
            storage: CacheBackend::default(),
            manifest: ShellManifest::default(),
        }
    }
}

impl Default for ShellManifest {
    fn default() -> Self {
        Self {
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            entry_point: default_entry_point(),
            resources: default_resources(),
        }
    }
}

impl ShellManifest {
    /// Name of this generation's cache, e.g. `pos-system-v1`
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Whether `name` belongs to this application (any generation)
    pub fn owns_cache(&self, name: &str) -> bool {
        name.strip_prefix(&self.cache_prefix)
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Resolve a manifest path against the deployment scope
///
/// Leading slashes are relative to the scope, not the origin, so a shell
/// served from `/pos/` caches `/pos/index.html` for `/index.html`.
pub fn resolve(scope: &Url, path: &str) -> Result<Url, url::ParseError> {
    scope.join(path.trim_start_matches('/'))
}

impl ShellConfig {
    /// Load from a TOML file
    ///
    /// A missing file gives defaults; a malformed one is logged and replaced
    /// by defaults so a bad deploy never stops the shell from loading.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(?path, error = %e, "Failed to read shell config, using defaults");
                return Self::default();
            }
        };

        Self::parse(&content).unwrap_or_else(|e| {
            tracing::warn!(?path, error = %e, "Malformed shell config, using defaults");
            Self::default()
        })
    }

    /// Load from default path (./pos-shell.toml)
    pub fn load_default() -> Self {
        Self::load("pos-shell.toml")
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(content)
    }

    pub fn scope_url(&self) -> Result<Url, url::ParseError> {
        let mut scope = Url::parse(&self.scope)?;
        // Without a trailing slash `join` would replace the last segment
        if !scope.path().ends_with('/') {
            let path = format!("{}/", scope.path());
            scope.set_path(&path);
        }
        Ok(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_default_manifest() {
        let manifest = ShellManifest::default();
        assert_eq!(manifest.cache_name(), "pos-system-v1");
        assert_eq!(manifest.entry_point, "/index.html");
        assert_eq!(manifest.resources.len(), 23);
        assert!(manifest.resources.contains(&"/manifest.json".to_string()));
    }

    #[rstest]
    #[case("pos-system-v1", true)]
    #[case("pos-system-v0", true)]
    #[case("pos-systemic-v1", false)]
    #[case("other-app-v1", false)]
    fn test_owns_cache(#[case] name: &str, #[case] owned: bool) {
        assert_eq!(ShellManifest::default().owns_cache(name), owned);
    }

    #[rstest]
    #[case("https://shop.example.com/", "/index.html", "https://shop.example.com/index.html")]
    #[case("https://shop.example.com/pos/", "/index.html", "https://shop.example.com/pos/index.html")]
    #[case("https://shop.example.com/pos/", "/", "https://shop.example.com/pos/")]
    #[case("https://shop.example.com/pos", "/assets/js/sync.js", "https://shop.example.com/pos/assets/js/sync.js")]
    fn test_resolve_against_scope(#[case] scope: &str, #[case] path: &str, #[case] expected: &str) {
        let config = ShellConfig {
            scope: scope.to_string(),
            ..ShellConfig::default()
        };
        let scope = config.scope_url().unwrap();
        assert_eq!(resolve(&scope, path).unwrap().as_str(), expected);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = ShellConfig::parse(
            r#"
            scope = "https://shop.example.com/pos/"
            skip_waiting = false

            [manifest]
            version = "v2"
            "#,
        )
        .unwrap();
        assert!(!config.skip_waiting);
        assert_eq!(config.manifest.cache_name(), "pos-system-v2");
        assert_eq!(config.manifest.resources, default_resources());
        assert_eq!(config.storage, CacheBackend::Memory);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pos-shell.toml");
        fs::write(&path, "manifest = [[[ not toml").unwrap();

        assert_eq!(ShellConfig::load(&path), ShellConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        assert_eq!(
            ShellConfig::load("/nonexistent/pos-shell.toml"),
            ShellConfig::default()
        );
    }
}
