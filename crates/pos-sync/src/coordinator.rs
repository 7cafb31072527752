// File: pos-sync/src/coordinator.rs
// Purpose: Drains the change queue through the transport under intermittent connectivity

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::local_state::StateChanged;
use crate::messages::ClientMessage;
use crate::network::{NetworkStatus, NetworkStatusSource};
use crate::queue::{ChangeKind, ChangeRecord, PersistentQueue};
use crate::status::{
    NotificationLevel, SyncNotification, SyncOutcome, SyncState, SyncStatus, SyncTrigger,
};
use crate::store::{KeyValueStore, LAST_SYNC_KEY};
use crate::timer::Timer;
use crate::transport::{build_transport, SyncRequest, Transport};

/// Orchestrates sync sessions
///
/// Cloning is cheap; clones share one queue and one state machine. At most
/// one session is in flight at any time.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    queue: tokio::sync::Mutex<PersistentQueue>,
    runtime: Mutex<Runtime>,
    last_sync_time: Mutex<Option<DateTime<Utc>>>,
    notifications: broadcast::Sender<SyncNotification>,
}

struct Runtime {
    state: SyncState,
    online: bool,
    /// Incremented per session so a stale session never overwrites state
    session: u64,
    ticker: Option<Timer>,
    /// Settle delay after reconnecting, or a scheduled retry
    pending: Option<Timer>,
    cancel: Option<oneshot::Sender<()>>,
    listeners: Vec<JoinHandle<()>>,
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
    }
}

impl Inner {
    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        let _ = self
            .notifications
            .send(SyncNotification::new(level, message));
    }
}

impl SyncCoordinator {
    /// Build a coordinator, loading queue state from `store`
    ///
    /// The coordinator starts `Offline`; `start` or `handle_online` brings it
    /// in line with the network.
    pub async fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = PersistentQueue::load(store.clone()).await;
        let last_sync_time = load_last_sync_time(store.as_ref()).await;
        let (notifications, _) = broadcast::channel(64);

        tracing::info!(
            transport = transport.name(),
            store = store.name(),
            queued = queue.queue().unsynced_count(),
            "Sync coordinator initialized"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                store,
                clock,
                queue: tokio::sync::Mutex::new(queue),
                runtime: Mutex::new(Runtime {
                    state: SyncState::Offline,
                    online: false,
                    session: 0,
                    ticker: None,
                    pending: None,
                    cancel: None,
                    listeners: Vec::new(),
                }),
                last_sync_time: Mutex::new(last_sync_time),
                notifications,
            }),
        }
    }

    /// Build a coordinator with the storage and transport named in `config`
    pub async fn from_config(config: SyncConfig) -> anyhow::Result<Self> {
        let store = config.storage.open().await?;
        let transport = build_transport(&config.transport)?;
        Ok(Self::new(config, transport, store, Arc::new(SystemClock)).await)
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    fn weak(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    /// Follow `network`: adopt its current status and react to transitions
    ///
    /// When it is online already, a non-empty queue is drained right away.
    pub async fn start(&self, network: Arc<dyn NetworkStatusSource>) {
        let mut rx = network.subscribe();

        if network.current().is_online() {
            {
                let mut rt = self.inner.runtime();
                rt.online = true;
                rt.state = SyncState::Idle;
                self.start_ticker(&mut rt);
            }
            let queued = self.inner.queue.lock().await.queue().unsynced_count();
            if queued > 0 {
                tracing::info!(queued, "Draining changes queued before startup");
                self.spawn_sync(SyncTrigger::Startup);
            }
        } else {
            self.handle_offline();
        }

        let weak = self.weak();
        let listener = tokio::spawn(async move {
            loop {
                let status = match rx.recv().await {
                    Ok(status) => status,
                    Err(broadcast::error::RecvError::Lagged(_)) => network.current(),
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                let coordinator = SyncCoordinator::from_inner(inner);
                match status {
                    NetworkStatus::Online => coordinator.handle_online(),
                    NetworkStatus::Offline => coordinator.handle_offline(),
                }
            }
        });
        self.inner.runtime().listeners.push(listener);
    }

    /// Connection restored: go `Idle`, drain after a settle delay, start ticking
    pub fn handle_online(&self) {
        let mut rt = self.inner.runtime();
        if rt.online {
            return;
        }

        tracing::info!("Connection restored - syncing data");
        rt.online = true;
        rt.state = SyncState::Idle;

        let weak = self.weak();
        rt.pending = Some(Timer::after(
            self.inner.config.schedule.online_settle(),
            move || run_weak(weak, SyncTrigger::Reconnect),
        ));
        self.start_ticker(&mut rt);
        drop(rt);

        self.inner
            .notify(NotificationLevel::Info, "Internet connected - syncing data...");
    }

    /// Connection lost: stop timers and cancel the in-flight send
    pub fn handle_offline(&self) {
        let mut rt = self.inner.runtime();
        if !rt.online && rt.state == SyncState::Offline {
            return;
        }

        tracing::warn!("Connection lost - queuing changes");
        rt.online = false;
        rt.state = SyncState::Offline;
        rt.ticker = None;
        rt.pending = None;
        if let Some(cancel) = rt.cancel.take() {
            let _ = cancel.send(());
        }
        drop(rt);

        self.inner.notify(
            NotificationLevel::Warning,
            "No internet - data will be stored locally",
        );
    }

    fn start_ticker(&self, rt: &mut Runtime) {
        if rt.ticker.is_some() {
            return;
        }
        let weak = self.weak();
        rt.ticker = Some(Timer::every(self.inner.config.schedule.interval(), move || {
            run_weak(weak.clone(), SyncTrigger::Tick)
        }));
    }

    fn spawn_sync(&self, trigger: SyncTrigger) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run_sync(trigger).await;
        });
    }

    /// Record a mutation; durable once this returns
    pub async fn enqueue(
        &self,
        kind: impl Into<ChangeKind>,
        payload: Value,
    ) -> Result<String, SyncError> {
        let kind = kind.into();
        let now = self.inner.clock.now();
        let id = {
            let mut queue = self.inner.queue.lock().await;
            queue.append(kind.clone(), payload, now).await?
        };
        tracing::debug!(%id, %kind, "Queued change");

        if self.inner.config.schedule.sync_on_enqueue {
            let idle_online = {
                let rt = self.inner.runtime();
                rt.online && rt.state == SyncState::Idle
            };
            if idle_online {
                self.spawn_sync(SyncTrigger::Enqueue);
            }
        }

        Ok(id)
    }

    /// Explicit sync request from the user
    ///
    /// Also resends records that exhausted their automatic retries.
    pub async fn force_sync_now(&self) -> SyncOutcome {
        if !self.is_online() {
            self.inner
                .notify(NotificationLevel::Error, "Cannot sync - no internet connection");
            return SyncOutcome::Offline;
        }

        self.inner
            .notify(NotificationLevel::Info, "Starting manual sync...");
        self.run_sync(SyncTrigger::Manual).await
    }

    /// Run one sync session
    pub async fn run_sync(&self, trigger: SyncTrigger) -> SyncOutcome {
        let (session, cancel_rx) = {
            let mut rt = self.inner.runtime();
            if !rt.online {
                return SyncOutcome::Offline;
            }
            match rt.state {
                SyncState::Syncing => {
                    tracing::debug!(?trigger, "Sync already in progress, trigger dropped");
                    return SyncOutcome::AlreadySyncing;
                }
                SyncState::Backoff { .. }
                    if !matches!(trigger, SyncTrigger::Retry | SyncTrigger::Manual) =>
                {
                    tracing::debug!(?trigger, "Retry pending, trigger deferred");
                    return SyncOutcome::Deferred;
                }
                _ => {}
            }

            rt.pending = None;
            rt.state = SyncState::Syncing;
            rt.session += 1;
            let (tx, rx) = oneshot::channel();
            rt.cancel = Some(tx);
            (rt.session, rx)
        };

        let ceiling = self.inner.config.schedule.retry_attempts;
        let batch: Vec<ChangeRecord> = {
            let queue = self.inner.queue.lock().await;
            queue
                .queue()
                .unsynced_snapshot()
                .into_iter()
                .filter(|r| trigger.bypasses_retry_ceiling() || r.attempts < ceiling)
                .collect()
        };

        if batch.is_empty() {
            self.finish_session(session, SyncState::Idle);
            return SyncOutcome::NothingToSync;
        }

        let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
        let count = ids.len();
        tracing::info!(count, ?trigger, "Syncing changes");

        let request = SyncRequest {
            changes: batch,
            user_id: self.inner.config.user_id.clone(),
            last_sync_time: self.last_sync_time(),
            timestamp: self.inner.clock.now(),
        };

        let result = tokio::select! {
            result = self.inner.transport.send(&request) => result,
            _ = cancel_rx => {
                tracing::info!(count, "Sync session cancelled by offline transition");
                return SyncOutcome::Cancelled;
            }
        };

        match result {
            Ok(ack) => {
                let now = self.inner.clock.now();
                let retention = self.inner.config.schedule.retention();
                let completed = {
                    let mut queue = self.inner.queue.lock().await;
                    queue.complete_batch(&ids, retention, now).await
                };
                if let Err(e) = completed {
                    tracing::error!(error = %e, "Failed to persist sync result");
                    self.finish_session(session, SyncState::Idle);
                    return SyncOutcome::Failed {
                        retry_scheduled: false,
                    };
                }

                self.set_last_sync_time(now).await;
                self.finish_session(session, SyncState::Idle);

                if ack.placeholder {
                    tracing::info!(count, "Sync completed locally (no server sync)");
                } else {
                    tracing::info!(count, "Sync completed successfully");
                    self.inner.notify(
                        NotificationLevel::Success,
                        "✓ Data synced successfully to server",
                    );
                }

                SyncOutcome::Synced {
                    count,
                    placeholder: ack.placeholder,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, transport = self.inner.transport.name(), "Sync failed");

                let (retryable, attempt) = {
                    let mut queue = self.inner.queue.lock().await;
                    if let Err(store_err) = queue.increment_attempts(&ids).await {
                        tracing::error!(error = %store_err, "Failed to persist attempt counters");
                    }
                    let attempts: Vec<u32> = ids
                        .iter()
                        .filter_map(|id| queue.queue().get(id))
                        .filter(|r| !r.synced)
                        .map(|r| r.attempts)
                        .collect();
                    (
                        attempts.iter().any(|a| *a < ceiling),
                        attempts.iter().copied().max().unwrap_or(0),
                    )
                };

                if retryable {
                    return SyncOutcome::Failed {
                        retry_scheduled: self.schedule_retry(session, attempt),
                    };
                }

                self.finish_session(session, SyncState::Idle);
                self.inner
                    .notify(NotificationLevel::Error, "Sync failed - will retry later");
                SyncOutcome::Failed {
                    retry_scheduled: false,
                }
            }
        }
    }

    /// Enter `Backoff` and arm the retry timer, unless the session went stale
    fn schedule_retry(&self, session: u64, attempt: u32) -> bool {
        let mut rt = self.inner.runtime();
        if rt.session != session || rt.state != SyncState::Syncing || !rt.online {
            return false;
        }

        let delay = self.inner.config.schedule.retry_delay();
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying sync after delay"
        );
        rt.state = SyncState::Backoff { attempt };
        rt.cancel = None;
        let weak = self.weak();
        rt.pending = Some(Timer::after(delay, move || {
            run_weak(weak, SyncTrigger::Retry)
        }));
        true
    }

    fn finish_session(&self, session: u64, next: SyncState) {
        let mut rt = self.inner.runtime();
        if rt.session == session && rt.state == SyncState::Syncing {
            rt.state = if rt.online { next } else { SyncState::Offline };
            rt.cancel = None;
        }
    }

    /// Enqueue a record for every saved local-state event
    pub fn follow_state_changes(&self, mut rx: broadcast::Receiver<StateChanged>) {
        let weak = self.weak();
        let listener = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Missed local state changes");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                let coordinator = SyncCoordinator::from_inner(inner);
                if let Err(e) = coordinator.enqueue(event.kind, event.payload).await {
                    tracing::error!(error = %e, "Failed to queue local state change");
                }
            }
        });
        self.inner.runtime().listeners.push(listener);
    }

    /// React to messages from the resource cache manager
    pub fn listen_for_client_messages(&self, mut rx: broadcast::Receiver<ClientMessage>) {
        let weak = self.weak();
        let listener = tokio::spawn(async move {
            loop {
                let message = match rx.recv().await {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                let coordinator = SyncCoordinator::from_inner(inner);
                match message {
                    ClientMessage::SyncRequested { timestamp } => {
                        tracing::info!(%timestamp, "Cache manager requested sync");
                        coordinator.spawn_sync(SyncTrigger::Message);
                    }
                    ClientMessage::UpdateAvailable { cache_name } => {
                        tracing::info!(%cache_name, "New application version available");
                        coordinator.inner.notify(
                            NotificationLevel::Info,
                            "New version available! Refresh to update.",
                        );
                    }
                    ClientMessage::ControllerChanged { cache_name } => {
                        tracing::debug!(%cache_name, "Cache manager took control");
                    }
                }
            }
        });
        self.inner.runtime().listeners.push(listener);
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<SyncNotification> {
        self.inner.notifications.subscribe()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let (online, state) = {
            let rt = self.inner.runtime();
            (rt.online, rt.state)
        };
        let queue = self.inner.queue.lock().await;
        SyncStatus {
            online,
            syncing: state == SyncState::Syncing,
            state,
            queued_changes: queue.queue().unsynced_count(),
            total_changes: queue.queue().len(),
            last_sync_time: self.last_sync_time(),
            recovered_from_corruption: queue.recovered_from_corruption(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.inner.runtime().state
    }

    pub fn is_online(&self) -> bool {
        self.inner.runtime().online
    }

    /// Copy of every record, synced ones included
    pub async fn records(&self) -> Vec<ChangeRecord> {
        self.inner.queue.lock().await.queue().records().to_vec()
    }

    /// Drop every queued record. Destructive; meant for resets and tests.
    pub async fn clear_queue(&self) -> Result<(), SyncError> {
        self.inner.queue.lock().await.clear().await?;
        Ok(())
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_sync_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn set_last_sync_time(&self, at: DateTime<Utc>) {
        *self
            .inner
            .last_sync_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
        if let Err(e) = self.inner.store.set(LAST_SYNC_KEY, &at.to_rfc3339()).await {
            tracing::warn!(error = %e, "Failed to persist last sync time");
        }
    }

    /// Stop timers and listeners and cancel any in-flight send
    ///
    /// The coordinator ends up `Offline` and runs no further sessions.
    pub fn shutdown(&self) {
        let mut rt = self.inner.runtime();
        rt.online = false;
        rt.state = SyncState::Offline;
        rt.ticker = None;
        rt.pending = None;
        if let Some(cancel) = rt.cancel.take() {
            let _ = cancel.send(());
        }
        for listener in rt.listeners.drain(..) {
            listener.abort();
        }
        tracing::info!("Sync coordinator stopped");
    }
}

async fn run_weak(weak: Weak<Inner>, trigger: SyncTrigger) {
    if let Some(inner) = weak.upgrade() {
        SyncCoordinator::from_inner(inner).run_sync(trigger).await;
    }
}

async fn load_last_sync_time(store: &dyn KeyValueStore) -> Option<DateTime<Utc>> {
    match store.get(LAST_SYNC_KEY).await {
        Ok(Some(raw)) => match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(error = %e, "Stored last sync time is malformed, ignoring");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read last sync time");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::network::ManualNetwork;
    use crate::store::MemoryStore;
    use crate::transport::NullTransport;
    use serde_json::json;
    use std::time::Duration;

    async fn coordinator_with(config: SyncConfig) -> SyncCoordinator {
        SyncCoordinator::new(
            config,
            Arc::new(NullTransport::new(Duration::from_millis(10))),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_offline_until_network_known() {
        let coordinator = coordinator_with(SyncConfig::default()).await;
        assert_eq!(coordinator.state(), SyncState::Offline);

        coordinator.start(Arc::new(ManualNetwork::online())).await;
        assert_eq!(coordinator.state(), SyncState::Idle);
        assert!(coordinator.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_tick_is_noop() {
        let coordinator = coordinator_with(SyncConfig::default()).await;
        coordinator.handle_online();
        assert_eq!(
            coordinator.run_sync(SyncTrigger::Tick).await,
            SyncOutcome::NothingToSync
        );
        assert_eq!(coordinator.state(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_ack_suppresses_success_notification() {
        let mut config = SyncConfig::default();
        config.schedule.sync_on_enqueue = false;
        let coordinator = coordinator_with(config).await;
        coordinator.handle_online();
        let mut notes = coordinator.subscribe_notifications();

        coordinator.enqueue(ChangeKind::FullSync, json!({})).await.unwrap();
        let outcome = coordinator.run_sync(SyncTrigger::Manual).await;
        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                count: 1,
                placeholder: true
            }
        );

        while let Ok(note) = notes.try_recv() {
            assert_ne!(note.level, NotificationLevel::Success);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_last_sync_time_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set(LAST_SYNC_KEY, "yesterday-ish").await.unwrap();
        let coordinator = SyncCoordinator::new(
            SyncConfig::default(),
            Arc::new(NullTransport::default()),
            store,
            Arc::new(SystemClock),
        )
        .await;
        assert!(coordinator.last_sync_time().is_none());
    }
}
