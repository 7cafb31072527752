// File: pos-sync/src/local_state.rs
// Purpose: Application state persistence that announces every save

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::queue::ChangeKind;
use crate::store::{KeyValueStore, APP_STATE_KEY};

/// Emitted after local state has been saved
#[derive(Debug, Clone, PartialEq)]
pub struct StateChanged {
    pub kind: ChangeKind,
    pub payload: Value,
}

/// Owner of the application's local snapshot
///
/// Saving writes the snapshot and then notifies subscribers, which is how
/// mutations reach the change queue.
pub struct LocalStateStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    tx: broadcast::Sender<StateChanged>,
}

impl LocalStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, APP_STATE_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            store,
            key: key.into(),
            tx,
        }
    }

    /// Load the snapshot; absent or malformed state yields `None`
    pub async fn load(&self) -> Option<Value> {
        match self.store.get(&self.key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, key = %self.key, "Stored application state is corrupted");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "Failed to read application state");
                None
            }
        }
    }

    /// Save the full snapshot and announce it as a `full_sync` change
    pub async fn save(&self, snapshot: &Value) -> Result<(), StoreError> {
        self.save_as(ChangeKind::FullSync, snapshot).await
    }

    /// Save the snapshot, announcing it under `kind`
    pub async fn save_as(&self, kind: ChangeKind, snapshot: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot).map_err(|source| StoreError::Encode {
            key: self.key.clone(),
            source,
        })?;
        self.store.set(&self.key, &json).await?;

        let _ = self.tx.send(StateChanged {
            kind,
            payload: snapshot.clone(),
        });
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_persists_then_notifies() {
        let store = Arc::new(MemoryStore::new());
        let state = LocalStateStore::new(store.clone());
        let mut rx = state.subscribe();

        let snapshot = json!({"inventory": [{"id": "i1", "qty": 3}]});
        state.save(&snapshot).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::FullSync);
        assert_eq!(event.payload, snapshot);
        assert_eq!(state.load().await, Some(snapshot));
    }

    #[tokio::test]
    async fn test_corrupted_state_loads_as_none() {
        let store = Arc::new(MemoryStore::new());
        store.set(APP_STATE_KEY, "{{{").await.unwrap();
        let state = LocalStateStore::new(store);
        assert_eq!(state.load().await, None);
    }
}
