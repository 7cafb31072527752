// File: pos-sync/src/messages.rs
// Purpose: Messages exchanged between the application and the resource cache manager

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Background sync tag that makes the cache manager ask clients to sync
pub const SYNC_TAG: &str = "sync-data";

/// Application -> cache manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting generation right away
    SkipWaiting,
}

/// Cache manager -> application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Drain the change queue now
    SyncRequested { timestamp: DateTime<Utc> },
    /// A new cache generation is installed and waiting
    UpdateAvailable {
        #[serde(rename = "cacheName")]
        cache_name: String,
    },
    /// The cache manager took control of open clients
    ControllerChanged {
        #[serde(rename = "cacheName")]
        cache_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        assert_eq!(
            serde_json::to_value(WorkerMessage::SkipWaiting).unwrap(),
            json!({"type": "SKIP_WAITING"})
        );

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "SYNC_REQUESTED",
            "timestamp": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::SyncRequested { .. }));
    }
}
