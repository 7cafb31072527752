// File: pos-sync/src/status.rs
// Purpose: Coordinator state, status snapshots and user-facing notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    /// Waiting out the retry delay after a failed sync
    Backoff { attempt: u32 },
    Offline,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Backoff { attempt } => write!(f, "backoff({})", attempt),
            SyncState::Offline => write!(f, "offline"),
        }
    }
}

/// What asked for a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// `force_sync_now` from the UI
    Manual,
    /// Periodic timer
    Tick,
    /// Fixed-delay retry after a failure
    Retry,
    /// Connection came back
    Reconnect,
    /// A change was just queued
    Enqueue,
    /// Coordinator started while online with a non-empty queue
    Startup,
    /// Sync request relayed by the cache manager
    Message,
}

impl SyncTrigger {
    /// Only an explicit request resends records that hit the retry ceiling
    pub fn bypasses_retry_ceiling(self) -> bool {
        matches!(self, SyncTrigger::Manual)
    }
}

/// Result of one sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { count: usize, placeholder: bool },
    Failed { retry_scheduled: bool },
    NothingToSync,
    /// Another session is in flight; the trigger was dropped
    AlreadySyncing,
    /// A retry is pending; automatic triggers wait for it
    Deferred,
    Offline,
    /// Connection dropped while the batch was in flight
    Cancelled,
}

/// Snapshot exposed to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub state: SyncState,
    /// Unsynced records
    pub queued_changes: usize,
    /// All records, synced ones awaiting pruning included
    pub total_changes: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// The persisted queue was unreadable at startup and was reset to empty
    pub recovered_from_corruption: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Dismissible status message for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNotification {
    pub level: NotificationLevel,
    pub message: String,
}

impl SyncNotification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}
