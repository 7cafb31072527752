// File: pos-sync/src/network.rs
// Purpose: Online/offline signal sources

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;

/// Connectivity as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkStatus::Online => write!(f, "online"),
            NetworkStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Source of online/offline transitions
///
/// Dropping the receiver returned by `subscribe` unsubscribes.
pub trait NetworkStatusSource: Send + Sync {
    fn current(&self) -> NetworkStatus;

    fn subscribe(&self) -> broadcast::Receiver<NetworkStatus>;
}

/// Shared status cell that publishes only real transitions
#[derive(Clone)]
struct StatusCell {
    status: Arc<Mutex<NetworkStatus>>,
    tx: broadcast::Sender<NetworkStatus>,
}

impl StatusCell {
    fn new(initial: NetworkStatus) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            status: Arc::new(Mutex::new(initial)),
            tx,
        }
    }

    fn get(&self) -> NetworkStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, next: NetworkStatus) -> bool {
        {
            let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            if *status == next {
                return false;
            }
            *status = next;
        }
        // No subscribers is fine
        let _ = self.tx.send(next);
        true
    }
}

/// Network source driven by explicit calls
///
/// Used by tests and by embedders that receive connectivity events from
/// elsewhere.
#[derive(Clone)]
pub struct ManualNetwork {
    cell: StatusCell,
}

impl ManualNetwork {
    pub fn new(initial: NetworkStatus) -> Self {
        Self {
            cell: StatusCell::new(initial),
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkStatus::Online)
    }

    pub fn offline() -> Self {
        Self::new(NetworkStatus::Offline)
    }

    /// Publish a status; returns whether it was a transition
    pub fn set(&self, status: NetworkStatus) -> bool {
        self.cell.set(status)
    }

    pub fn go_online(&self) -> bool {
        self.set(NetworkStatus::Online)
    }

    pub fn go_offline(&self) -> bool {
        self.set(NetworkStatus::Offline)
    }
}

impl NetworkStatusSource for ManualNetwork {
    fn current(&self) -> NetworkStatus {
        self.cell.get()
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkStatus> {
        self.cell.tx.subscribe()
    }
}

/// Network source that polls a health URL
///
/// Any HTTP success counts as online; errors, timeouts and non-2xx replies
/// count as offline.
pub struct HttpProbeNetwork {
    cell: StatusCell,
    task: JoinHandle<()>,
}

impl HttpProbeNetwork {
    /// Probe once, then keep probing every `interval`
    pub async fn start(url: impl Into<String>, interval: Duration) -> Result<Self, reqwest::Error> {
        let url = url.into();
        let http = Client::builder().timeout(interval.max(Duration::from_secs(1))).build()?;

        let initial = probe(&http, &url).await;
        tracing::info!(%url, status = %initial, "Network probe started");
        let cell = StatusCell::new(initial);

        let task_cell = cell.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let status = probe(&http, &url).await;
                if task_cell.set(status) {
                    tracing::info!(%url, %status, "Network status changed");
                }
            }
        });

        Ok(Self { cell, task })
    }
}

async fn probe(http: &Client, url: &str) -> NetworkStatus {
    match http.get(url).send().await {
        Ok(res) if res.status().is_success() => NetworkStatus::Online,
        Ok(res) => {
            tracing::debug!(status = %res.status(), "Probe returned non-success");
            NetworkStatus::Offline
        }
        Err(e) => {
            tracing::debug!(error = %e, "Probe failed");
            NetworkStatus::Offline
        }
    }
}

impl NetworkStatusSource for HttpProbeNetwork {
    fn current(&self) -> NetworkStatus {
        self.cell.get()
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkStatus> {
        self.cell.tx.subscribe()
    }
}

/// Pick the network source for a configuration
///
/// With a probe URL connectivity is polled; without one the source starts
/// online and transitions must be injected through `ManualNetwork`.
pub async fn build_network(
    config: &NetworkConfig,
) -> Result<Arc<dyn NetworkStatusSource>, reqwest::Error> {
    match &config.probe_url {
        Some(url) => Ok(Arc::new(
            HttpProbeNetwork::start(url.clone(), config.probe_interval()).await?,
        )),
        None => Ok(Arc::new(ManualNetwork::online())),
    }
}

impl Drop for HttpProbeNetwork {
    fn drop(&mut self) {
        self.task.abort();
    }
}
