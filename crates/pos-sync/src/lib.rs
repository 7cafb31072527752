// File: pos-sync/src/lib.rs
// Purpose: Main entry point for the pos-sync library

//! # pos-sync
//!
//! Offline-first change capture and background synchronization for the POS
//! client. Every local mutation lands in a durable change queue; the sync
//! coordinator drains it to the remote store whenever the device is online.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pos_sync::{build_network, SyncConfig, SyncCoordinator};
//!
//! let config = SyncConfig::load_default()?;
//! let network = build_network(&config.network).await?;
//! let coordinator = SyncCoordinator::from_config(config).await?;
//! coordinator.start(network).await;
//!
//! coordinator.enqueue("sale", serde_json::json!({ "total": 12.5 })).await?;
//! println!("{:?}", coordinator.sync_status().await);
//! ```

pub mod clock;
pub mod compression;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod local_state;
pub mod messages;
pub mod network;
pub mod queue;
pub mod status;
pub mod store;
pub mod timer;
pub mod transport;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use compression::CompressionConfig;
pub use config::{NetworkConfig, ScheduleConfig, StorageBackend, SyncConfig, TransportConfig};
pub use coordinator::SyncCoordinator;
pub use error::{StoreError, SyncError, TransportError};
pub use local_state::{LocalStateStore, StateChanged};
pub use messages::{ClientMessage, WorkerMessage, SYNC_TAG};
pub use network::{build_network, HttpProbeNetwork, ManualNetwork, NetworkStatus, NetworkStatusSource};
pub use queue::{ChangeKind, ChangeQueue, ChangeRecord, PersistentQueue};
pub use status::{
    NotificationLevel, SyncNotification, SyncOutcome, SyncState, SyncStatus, SyncTrigger,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use timer::Timer;
pub use transport::{
    build_transport, NullTransport, RemoteTransport, SyncAck, SyncRequest, SyncResponse, Transport,
};
