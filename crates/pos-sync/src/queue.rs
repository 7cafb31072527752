// File: pos-sync/src/queue.rs
// Purpose: Durable queue of local changes awaiting remote acknowledgement

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{KeyValueStore, QUEUE_KEY};

/// What a change record describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeKind {
    /// Snapshot of the whole local state
    FullSync,
    /// Change scoped to one logical entity (e.g. `inventory`, `sales`)
    Entity(String),
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::FullSync => write!(f, "full_sync"),
            ChangeKind::Entity(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for ChangeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "full_sync" => ChangeKind::FullSync,
            _ => ChangeKind::Entity(value),
        }
    }
}

impl From<&str> for ChangeKind {
    fn from(value: &str) -> Self {
        ChangeKind::from(value.to_string())
    }
}

impl From<ChangeKind> for String {
    fn from(kind: ChangeKind) -> Self {
        kind.to_string()
    }
}

/// A single pending mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    #[serde(rename = "timestamp")]
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default)]
    pub attempts: u32,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, payload: serde_json::Value, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: new_change_id(),
            kind,
            payload,
            enqueued_at,
            synced: false,
            attempts: 0,
        }
    }
}

fn new_change_id() -> String {
    format!("change_{}", uuid::Uuid::new_v4().simple())
}

/// Ordered, in-memory change queue
///
/// Insertion order is delivery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeQueue {
    records: Vec<ChangeRecord>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    /// Append a record, returning its id
    pub fn append(&mut self, record: ChangeRecord) -> String {
        let id = record.id.clone();
        self.records.push(record);
        id
    }

    /// Flag the given records as synced. Unknown ids are ignored.
    pub fn mark_synced(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut marked = 0;
        for record in self.records.iter_mut().filter(|r| ids.contains(r.id.as_str())) {
            if !record.synced {
                record.synced = true;
                marked += 1;
            }
        }
        marked
    }

    /// Bump the attempt counter on the given unsynced records
    pub fn increment_attempts(&mut self, ids: &[String]) {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        for record in self
            .records
            .iter_mut()
            .filter(|r| !r.synced && ids.contains(r.id.as_str()))
        {
            record.attempts += 1;
        }
    }

    /// Drop synced records enqueued before `now - window`
    pub fn prune_synced_older_than(&mut self, window: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return 0;
        };
        let before = self.records.len();
        self.records
            .retain(|r| !r.synced || r.enqueued_at > cutoff);
        before - self.records.len()
    }

    /// Owned copy of the unsynced records, oldest first
    pub fn unsynced_snapshot(&self) -> Vec<ChangeRecord> {
        self.records.iter().filter(|r| !r.synced).cloned().collect()
    }

    pub fn unsynced_count(&self) -> usize {
        self.records.iter().filter(|r| !r.synced).count()
    }

    pub fn get(&self, id: &str) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Change queue mirrored to a key-value store
///
/// Each mutation is applied to a copy, persisted, and only then committed, so
/// a failed write leaves the queue as it was.
pub struct PersistentQueue {
    queue: ChangeQueue,
    store: Arc<dyn KeyValueStore>,
    recovered_from_corruption: bool,
}

impl PersistentQueue {
    /// Load the queue from `store`
    ///
    /// Absent state yields an empty queue. Unreadable or malformed state is
    /// logged and reset to empty.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let (queue, recovered_from_corruption) = match store.get(QUEUE_KEY).await {
            Ok(None) => (ChangeQueue::new(), false),
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ChangeRecord>>(&raw) {
                Ok(records) => {
                    tracing::info!("Loaded {} queued changes", records.len());
                    (ChangeQueue::from_records(records), false)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored sync queue is corrupted, starting empty");
                    (ChangeQueue::new(), true)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, backend = store.name(), "Failed to read sync queue, starting empty");
                (ChangeQueue::new(), true)
            }
        };

        Self {
            queue,
            store,
            recovered_from_corruption,
        }
    }

    /// Whether loading discarded unreadable state
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    /// Append a change; durable once this returns `Ok`
    pub async fn append(
        &mut self,
        kind: ChangeKind,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let record = ChangeRecord::new(kind, payload, now);
        let mut id = String::new();
        self.commit(|q| id = q.append(record)).await?;
        Ok(id)
    }

    pub async fn increment_attempts(&mut self, ids: &[String]) -> Result<(), StoreError> {
        self.commit(|q| q.increment_attempts(ids)).await
    }

    /// Mark a batch synced and prune old synced records in one write
    pub async fn complete_batch(
        &mut self,
        ids: &[String],
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut pruned = 0;
        self.commit(|q| {
            q.mark_synced(ids);
            pruned = q.prune_synced_older_than(retention, now);
        })
        .await?;
        Ok(pruned)
    }

    pub async fn clear(&mut self) -> Result<(), StoreError> {
        self.commit(ChangeQueue::clear).await?;
        tracing::info!("Sync queue cleared");
        Ok(())
    }

    async fn commit<F>(&mut self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ChangeQueue),
    {
        let mut staged = self.queue.clone();
        mutate(&mut staged);

        let json = serde_json::to_string(staged.records()).map_err(|source| StoreError::Encode {
            key: QUEUE_KEY.to_string(),
            source,
        })?;
        self.store.set(QUEUE_KEY, &json).await?;

        self.queue = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(kind: &str, at: DateTime<Utc>) -> ChangeRecord {
        ChangeRecord::new(ChangeKind::from(kind), json!({"k": kind}), at)
    }

    #[test]
    fn test_change_kind_round_trip() {
        assert_eq!(ChangeKind::from("full_sync"), ChangeKind::FullSync);
        assert_eq!(ChangeKind::from("sales"), ChangeKind::Entity("sales".into()));
        assert_eq!(ChangeKind::FullSync.to_string(), "full_sync");
    }

    #[test]
    fn test_record_wire_names() {
        let now = Utc::now();
        let rec = record("full_sync", now);
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["type"], "full_sync");
        assert_eq!(value["data"], json!({"k": "full_sync"}));
        assert_eq!(value["synced"], false);
        assert_eq!(value["attempts"], 0);
        assert!(value["timestamp"].is_string());
        assert!(rec.id.starts_with("change_"));
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let mut queue = ChangeQueue::new();
        let ids: HashSet<String> = (0..100).map(|_| queue.append(record("x", now))).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_snapshot_is_ordered_and_detached() {
        let now = Utc::now();
        let mut queue = ChangeQueue::new();
        let a = queue.append(record("a", now));
        let b = queue.append(record("b", now));

        let snapshot = queue.unsynced_snapshot();
        queue.append(record("c", now));
        queue.mark_synced(&[a.clone()]);

        let ids: Vec<_> = snapshot.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(snapshot.iter().all(|r| !r.synced));
        assert_eq!(queue.unsynced_count(), 2);
    }

    #[test]
    fn test_mark_synced_ignores_unknown_ids() {
        let now = Utc::now();
        let mut queue = ChangeQueue::new();
        let a = queue.append(record("a", now));
        assert_eq!(queue.mark_synced(&["nope".to_string(), a.clone()]), 1);
        assert_eq!(queue.mark_synced(&[a]), 0);
    }

    #[test]
    fn test_increment_attempts_skips_synced() {
        let now = Utc::now();
        let mut queue = ChangeQueue::new();
        let a = queue.append(record("a", now));
        let b = queue.append(record("b", now));
        queue.mark_synced(&[a.clone()]);
        queue.increment_attempts(&[a.clone(), b.clone()]);

        assert_eq!(queue.get(&a).unwrap().attempts, 0);
        assert_eq!(queue.get(&b).unwrap().attempts, 1);
    }

    #[test]
    fn test_prune_only_old_synced() {
        let now = Utc::now();
        let old = now - Duration::hours(25);
        let mut queue = ChangeQueue::new();
        let old_synced = queue.append(record("a", old));
        let old_pending = queue.append(record("b", old));
        let fresh_synced = queue.append(record("c", now));
        queue.mark_synced(&[old_synced.clone(), fresh_synced.clone()]);

        let pruned = queue.prune_synced_older_than(Duration::hours(24), now);

        assert_eq!(pruned, 1);
        assert!(queue.get(&old_synced).is_none());
        assert!(queue.get(&old_pending).is_some());
        assert!(queue.get(&fresh_synced).is_some());
    }

    #[test]
    fn test_prune_window_beyond_calendar_keeps_everything() {
        let now = Utc::now();
        let mut queue = ChangeQueue::new();
        let id = queue.append(record("a", now - Duration::hours(25)));
        queue.mark_synced(&[id.clone()]);

        assert_eq!(queue.prune_synced_older_than(Duration::days(1_000_000_000), now), 0);
        assert!(queue.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_persistent_queue_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let id = {
            let mut pq = PersistentQueue::load(store.clone()).await;
            pq.append(ChangeKind::FullSync, json!({"inventory": []}), now)
                .await
                .unwrap()
        };

        let pq = PersistentQueue::load(store).await;
        assert!(!pq.recovered_from_corruption());
        assert_eq!(pq.queue().len(), 1);
        assert_eq!(pq.queue().get(&id).unwrap().kind, ChangeKind::FullSync);
    }

    #[tokio::test]
    async fn test_corrupted_queue_resets_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(QUEUE_KEY, "{not json").await.unwrap();

        let pq = PersistentQueue::load(store).await;
        assert!(pq.recovered_from_corruption());
        assert!(pq.queue().is_empty());
    }

    #[tokio::test]
    async fn test_loads_queue_written_by_browser_client() {
        let store = Arc::new(MemoryStore::new());
        let raw = r#"[{"id":"change_1700000000000_abc123def","type":"full_sync","data":{"sales":[]},"timestamp":"2024-03-01T10:00:00.000Z","synced":false,"attempts":2}]"#;
        store.set(QUEUE_KEY, raw).await.unwrap();

        let pq = PersistentQueue::load(store).await;
        let rec = &pq.queue().records()[0];
        assert_eq!(rec.id, "change_1700000000000_abc123def");
        assert_eq!(rec.attempts, 2);
        assert_eq!(rec.kind, ChangeKind::FullSync);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }

        async fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_failed_append_leaves_queue_unchanged() {
        let mut pq = PersistentQueue::load(Arc::new(FailingStore)).await;
        let result = pq.append(ChangeKind::FullSync, json!({}), Utc::now()).await;

        assert!(result.is_err());
        assert!(pq.queue().is_empty());
    }
}
