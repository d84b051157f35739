//! Sync engine: one pass over the pending records.
//!
//! A pass selects pending records under the store lock, marks them as the
//! working set, and releases the lock while delivering so callers can keep
//! saving. Outcomes are applied and persisted in one batch at the end.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use super::delivery::{Delivery, DeliveryError};
use super::events::{SyncEvent, EVENT_CHANNEL_CAPACITY};
use super::policy::{select_pending, DeliveryOutcome, RetryPolicy, Transition};
use super::Connectivity;
use crate::hub::SubscriptionHub;
use crate::models::{Record, RecordId, SyncStatus};
use crate::store::RecordStore;
use crate::util::unix_millis_now;
use crate::Result;

/// Why a pass request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
}

/// Counts from a completed pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: usize,
    pub synced: usize,
    /// Failed but still pending
    pub failed: usize,
    pub conflicted: usize,
    pub status: SyncStatus,
}

/// Result of a pass request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    Skipped(SkipReason),
    Completed(PassSummary),
}

impl SyncReport {
    pub const fn summary(&self) -> Option<&PassSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped(_) => None,
        }
    }
}

/// Holds the running flag for one pass.
///
/// Once a working set is marked the guard tracks the store. A pass dropped
/// before its outcomes are applied clears that working set before the flag
/// resets.
struct PassGuard {
    running: Arc<AtomicBool>,
    store: Option<Arc<Mutex<RecordStore>>>,
}

impl PassGuard {
    fn acquire(running: &Arc<AtomicBool>) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                running: Arc::clone(running),
                store: None,
            })
    }

    fn track(&mut self, store: &Arc<Mutex<RecordStore>>) {
        self.store = Some(Arc::clone(store));
    }

    /// The working set was cleared by the pass itself.
    fn settle(&mut self) {
        self.store = None;
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            self.running.store(false, Ordering::Release);
            return;
        };
        tracing::debug!("Sync pass dropped before completion; clearing its working set");

        if let Ok(mut locked) = store.try_lock() {
            locked.clear_in_flight();
            drop(locked);
            self.running.store(false, Ordering::Release);
            return;
        }

        let running = Arc::clone(&self.running);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.lock().await.clear_in_flight();
                    running.store(false, Ordering::Release);
                });
            }
            Err(_) => running.store(false, Ordering::Release),
        }
    }
}

/// Aborts a delivery task when the pass awaiting it is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Orchestrates sync passes for one store
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<Mutex<RecordStore>>,
    delivery: Arc<dyn Delivery>,
    connectivity: Connectivity,
    hub: SubscriptionHub,
    policy: RetryPolicy,
    events: broadcast::Sender<SyncEvent>,
    running: Arc<AtomicBool>,
    /// Unix ms of the last completed pass, 0 when none ran yet
    last_sync_at: Arc<AtomicI64>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Mutex<RecordStore>>,
        delivery: Arc<dyn Delivery>,
        connectivity: Connectivity,
        hub: SubscriptionHub,
        policy: RetryPolicy,
    ) -> Self {
        let (events, _receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            delivery,
            connectivity,
            hub,
            policy,
            events,
            running: Arc::new(AtomicBool::new(false)),
            last_sync_at: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn last_sync_at(&self) -> Option<i64> {
        match self.last_sync_at.load(Ordering::Acquire) {
            0 => None,
            at => Some(at),
        }
    }

    /// Compute a status snapshot from a locked store.
    pub fn status_of(&self, store: &RecordStore) -> Result<SyncStatus> {
        let mut status = SyncStatus {
            is_online: self.is_online(),
            is_syncing: self.is_running(),
            total: store.len(),
            storage_bytes: store.serialized_len()?,
            last_sync_at: self.last_sync_at(),
            ..SyncStatus::default()
        };
        for record in store.iter() {
            if record.is_pending() {
                status.pending += 1;
                if record.has_failed() {
                    status.failed += 1;
                }
            } else if record.is_conflicted() {
                status.conflicted += 1;
            } else {
                status.synced += 1;
            }
        }
        Ok(status)
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        let store = self.store.lock().await;
        self.status_of(&store)
    }

    /// Run one pass if online and no pass is running.
    pub async fn run_pass(&self) -> Result<SyncReport> {
        if !self.is_online() {
            tracing::debug!("Sync pass skipped: offline");
            return Ok(SyncReport::Skipped(SkipReason::Offline));
        }
        let Some(mut guard) = PassGuard::acquire(&self.running) else {
            tracing::debug!("Sync pass skipped: a pass is already running");
            return Ok(SyncReport::Skipped(SkipReason::AlreadyRunning));
        };

        let batch: Vec<Record> = {
            let mut store = self.store.lock().await;
            let batch: Vec<Record> = select_pending(store.iter()).into_iter().cloned().collect();
            let ids: Vec<RecordId> = batch.iter().map(|record| record.id).collect();
            store.clear_in_flight();
            store.mark_in_flight(&ids);
            guard.track(&self.store);
            batch
        };
        tracing::info!("Sync pass started with {} pending record(s)", batch.len());

        let mut outcomes = Vec::with_capacity(batch.len());
        for record in batch {
            let id = record.id;
            let outcome = self.attempt(record).await;
            outcomes.push((id, outcome));
        }

        self.apply_outcomes(outcomes, &mut guard).await
    }

    /// Deliver one record on its own task so a panic only fails that record.
    async fn attempt(&self, record: Record) -> DeliveryOutcome {
        let delivery = Arc::clone(&self.delivery);
        let id = record.id;
        let mut task = AbortOnDrop(tokio::spawn(async move { delivery.attempt(&record).await }));
        match (&mut task.0).await {
            Ok(Ok(())) => DeliveryOutcome::Delivered,
            Ok(Err(error)) => {
                tracing::debug!("Delivery of {} failed: {}", id, error);
                DeliveryOutcome::Failed(error.to_string())
            }
            Err(join_error) => {
                tracing::warn!("Delivery of {} aborted: {}", id, join_error);
                DeliveryOutcome::Failed(DeliveryError::Panicked(join_error.to_string()).to_string())
            }
        }
    }

    /// Apply outcomes and persist them in one write.
    ///
    /// A failed write keeps the outcomes in memory (the deliveries already
    /// happened) and still notifies observers before returning the error.
    async fn apply_outcomes(
        &self,
        outcomes: Vec<(RecordId, DeliveryOutcome)>,
        guard: &mut PassGuard,
    ) -> Result<SyncReport> {
        let mut store = self.store.lock().await;
        store.clear_in_flight();
        guard.settle();

        let attempted = outcomes.len();
        let (mut synced, mut failed) = (0, 0);
        let mut conflicts: Vec<(RecordId, String)> = Vec::new();
        let mut changed_types: BTreeSet<String> = BTreeSet::new();

        for (id, outcome) in &outcomes {
            let Some(record) = store.get_mut(id) else {
                tracing::debug!("Record {} was removed during the pass", id);
                continue;
            };
            if !record.is_pending() {
                continue;
            }
            match self.policy.apply(record, outcome) {
                Transition::Synced => synced += 1,
                Transition::Retrying(_) => failed += 1,
                Transition::Conflicted => {
                    tracing::warn!(
                        "Record {} ({}) conflicted after {} failed attempts",
                        record.id,
                        record.record_type,
                        record.retry_count
                    );
                    conflicts.push((record.id, record.record_type.clone()));
                }
            }
            changed_types.insert(record.record_type.clone());
        }

        let persisted = if changed_types.is_empty() {
            Ok(0)
        } else {
            store.persist().await
        };
        if let Err(error) = &persisted {
            tracing::error!("Persisting sync pass results failed: {}", error);
        } else {
            self.last_sync_at.store(unix_millis_now(), Ordering::Release);
        }

        let mut status = self.status_of(&store)?;
        status.is_syncing = false;
        let notifications = self
            .hub
            .prepare(&store, changed_types.iter().map(String::as_str));
        drop(store);

        self.hub.dispatch(notifications);
        for (id, record_type) in &conflicts {
            let _ = self.events.send(SyncEvent::Conflict {
                id: *id,
                record_type: record_type.clone(),
            });
        }
        let _ = self.events.send(SyncEvent::Status(status));
        persisted?;

        tracing::info!(
            "Sync pass finished: {} attempted, {} synced, {} failed, {} conflicted",
            attempted,
            synced,
            failed,
            conflicts.len()
        );

        Ok(SyncReport::Completed(PassSummary {
            attempted,
            synced,
            failed,
            conflicted: conflicts.len(),
            status,
        }))
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("policy", &self.policy)
            .field("running", &self.is_running())
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, SyncState};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Records delivery order and fails types listed in `failing`.
    #[derive(Default)]
    struct Recorder {
        delivered: StdMutex<Vec<serde_json::Value>>,
        failing: Vec<&'static str>,
    }

    #[async_trait]
    impl Delivery for Recorder {
        async fn attempt(&self, record: &Record) -> std::result::Result<(), DeliveryError> {
            self.delivered
                .lock()
                .unwrap()
                .push(record.payload.clone());
            if record.record_type == "explode" {
                panic!("transport bug");
            }
            if self.failing.contains(&record.record_type.as_str()) {
                return Err(DeliveryError::Network("timeout".to_string()));
            }
            Ok(())
        }
    }

    async fn engine_with(delivery: Arc<Recorder>, online: bool) -> SyncEngine {
        let store = RecordStore::open(Arc::new(MemoryStore::new()), "records")
            .await
            .unwrap();
        SyncEngine::new(
            Arc::new(Mutex::new(store)),
            delivery,
            Connectivity::new(online),
            SubscriptionHub::new(),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn offline_pass_is_skipped() {
        let engine = engine_with(Arc::new(Recorder::default()), false).await;
        assert_eq!(
            engine.run_pass().await.unwrap(),
            SyncReport::Skipped(SkipReason::Offline)
        );
    }

    #[tokio::test]
    async fn running_flag_blocks_second_pass() {
        let engine = engine_with(Arc::new(Recorder::default()), true).await;
        let guard = PassGuard::acquire(&engine.running).unwrap();

        assert_eq!(
            engine.run_pass().await.unwrap(),
            SyncReport::Skipped(SkipReason::AlreadyRunning)
        );

        drop(guard);
        assert!(!engine.is_running());
        assert!(matches!(
            engine.run_pass().await.unwrap(),
            SyncReport::Completed(_)
        ));
    }

    /// Parks every attempt forever and flags when the attempt is dropped.
    #[derive(Default)]
    struct Parked {
        released: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Delivery for Parked {
        async fn attempt(&self, _record: &Record) -> std::result::Result<(), DeliveryError> {
            let _released = SetOnDrop(Arc::clone(&self.released));
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_pass_clears_working_set_and_aborts_delivery() {
        let parked = Arc::new(Parked::default());
        let store = RecordStore::open(Arc::new(MemoryStore::new()), "records")
            .await
            .unwrap();
        let engine = SyncEngine::new(
            Arc::new(Mutex::new(store)),
            parked.clone(),
            Connectivity::new(true),
            SubscriptionHub::new(),
            RetryPolicy::default(),
        );
        let id = {
            let mut store = engine.store.lock().await;
            store.save("job_update", json!("stuck"), Priority::High).await.unwrap().id
        };

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_secs(5), engine.run_pass()).await;
        assert!(cancelled.is_err());

        for _ in 0..10 {
            if parked.released.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(parked.released.load(Ordering::SeqCst));
        assert!(!engine.is_running());
        let store = engine.store.lock().await;
        assert!(!store.is_in_flight(&id));
        assert_eq!(store.get(&id).unwrap().sync_state, SyncState::Pending);
        assert_eq!(store.get(&id).unwrap().retry_count, 0);
    }

    #[tokio::test]
    async fn panicking_delivery_only_fails_its_record() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder.clone(), true).await;
        let (bad, good) = {
            let mut store = engine.store.lock().await;
            let bad = store.save("explode", json!("bad"), Priority::Critical).await.unwrap().id;
            let good = store.save("job_update", json!("good"), Priority::Low).await.unwrap().id;
            (bad, good)
        };

        let report = engine.run_pass().await.unwrap();

        let summary = report.summary().unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.failed, 1);
        let store = engine.store.lock().await;
        assert_eq!(store.get(&good).unwrap().sync_state, SyncState::Synced);
        let bad = store.get(&bad).unwrap();
        assert_eq!(bad.retry_count, 1);
        assert!(bad.last_error.as_deref().unwrap_or_default().contains("panicked"));
    }

    #[tokio::test]
    async fn conflict_emits_event() {
        let recorder = Arc::new(Recorder {
            failing: vec!["andon_event"],
            ..Recorder::default()
        });
        let engine = engine_with(recorder, true).await;
        let mut events = engine.events();
        let id = {
            let mut store = engine.store.lock().await;
            store.save("andon_event", json!("stop"), Priority::High).await.unwrap().id
        };

        for _ in 0..3 {
            engine.run_pass().await.unwrap();
        }

        let mut conflict_seen = false;
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::Conflict { id: conflicted, record_type } = event {
                assert_eq!(conflicted, id);
                assert_eq!(record_type, "andon_event");
                conflict_seen = true;
            }
        }
        assert!(conflict_seen);
        assert_eq!(engine.status().await.unwrap().conflicted, 1);
    }

    #[tokio::test]
    async fn status_counts_states() {
        let recorder = Arc::new(Recorder {
            failing: vec!["andon_event"],
            ..Recorder::default()
        });
        let engine = engine_with(recorder, true).await;
        {
            let mut store = engine.store.lock().await;
            store.save("andon_event", json!(1), Priority::High).await.unwrap();
            store.save("job_update", json!(2), Priority::High).await.unwrap();
        }

        let before = engine.status().await.unwrap();
        assert_eq!(before.pending, 2);
        assert!(before.last_sync_at.is_none());

        engine.run_pass().await.unwrap();

        let after = engine.status().await.unwrap();
        assert_eq!(after.total, 2);
        assert_eq!(after.pending, 1);
        assert_eq!(after.failed, 1);
        assert_eq!(after.synced, 1);
        assert!(!after.is_syncing);
        assert!(after.last_sync_at.is_some());
        assert!(after.storage_bytes > 0);
    }
}
