// File: pos-sync/src/config.rs
// Purpose: Configuration parsing from pos-sync.toml

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::compression::CompressionConfig;
use crate::error::StoreError;
use crate::store::{FileStore, KeyValueStore, MemoryStore};

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// User the pushed batches are attributed to
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub storage: StorageBackend,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// Timing and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Periodic sync interval while online
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Attempts per record before automatic retries stop
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between a failed sync and its retry
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Delay after an online signal before draining
    #[serde(default = "default_online_settle_ms")]
    pub online_settle_ms: u64,

    /// How long synced records are kept before pruning
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,

    /// Drain immediately after each enqueue while online
    #[serde(default = "default_true")]
    pub sync_on_enqueue: bool,
}

/// Remote transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Remote sync endpoint; without one the placeholder transport is used
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Simulated latency of the placeholder transport
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,

    #[serde(default)]
    pub compression: CompressionConfig,
}

/// Where queue state is persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory storage (non-persistent)
    #[default]
    Memory,

    /// One file per key in a directory
    Filesystem { path: PathBuf },
}

/// Connectivity probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Health URL probed to detect connectivity; none means signals are injected
    #[serde(default)]
    pub probe_url: Option<String>,

    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

// Default values
fn default_interval_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_online_settle_ms() -> u64 {
    500
}

fn default_retention_hours() -> i64 {
    24
}

/// Longest retention accepted for synced records (ten years)
pub const MAX_RETENTION_HOURS: i64 = 24 * 365 * 10;

fn default_timeout_secs() -> u64 {
    30
}

fn default_mock_delay_ms() -> u64 {
    1_000
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            online_settle_ms: default_online_settle_ms(),
            retention_hours: default_retention_hours(),
            sync_on_enqueue: true,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            timeout_secs: default_timeout_secs(),
            mock_delay_ms: default_mock_delay_ms(),
            compression: CompressionConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl ScheduleConfig {
    /// Never zero; a zero period cannot drive a ticker
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn online_settle(&self) -> Duration {
        Duration::from_millis(self.online_settle_ms)
    }

    /// Clamped to `0..=MAX_RETENTION_HOURS`
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.clamp(0, MAX_RETENTION_HOURS))
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }
}

impl NetworkConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

impl StorageBackend {
    /// Open the configured store
    pub async fn open(&self) -> Result<Arc<dyn KeyValueStore>, StoreError> {
        match self {
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StorageBackend::Filesystem { path } => Ok(Arc::new(FileStore::open(path).await?)),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Missing file means defaults
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: SyncConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.interval_secs == 0 {
            bail!("schedule.interval_secs must be at least 1");
        }
        if !(0..=MAX_RETENTION_HOURS).contains(&schedule.retention_hours) {
            bail!(
                "schedule.retention_hours must be between 0 and {}, got {}",
                MAX_RETENTION_HOURS,
                schedule.retention_hours
            );
        }
        if self.network.probe_interval_secs == 0 {
            bail!("network.probe_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Load configuration from default path (./pos-sync.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("pos-sync.toml")
    }
}
