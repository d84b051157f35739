//! Offline store service: the public operational API of the sync engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::config::StoreConfig;
use crate::hub::{SubscriptionHub, SubscriptionId};
use crate::models::{Priority, Record, RecordId, SyncStatus};
use crate::quota::QuotaGuard;
use crate::storage::KeyValueStore;
use crate::store::RecordStore;
use crate::sync::policy::{self, select_pending, ResolveChoice, RetryPolicy};
use crate::sync::{Connectivity, Delivery, Scheduler, SyncEngine, SyncEvent, SyncReport};
use crate::Result;

/// One offline-first store instance with its injected collaborators.
///
/// All record mutations go through a single lock around the mutate-then-persist
/// sequence. Subscribers are notified after the lock is released.
pub struct OfflineStore {
    config: StoreConfig,
    store: Arc<Mutex<RecordStore>>,
    engine: SyncEngine,
    hub: SubscriptionHub,
    connectivity: Connectivity,
    scheduler: Mutex<Option<Scheduler>>,
}

impl OfflineStore {
    /// Open a store and start its background scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(
        config: StoreConfig,
        storage: Arc<dyn KeyValueStore>,
        delivery: Arc<dyn Delivery>,
        connectivity: Connectivity,
    ) -> Result<Self> {
        let service = Self::open_manual(config, storage, delivery, connectivity).await?;
        let scheduler = Scheduler::spawn(
            service.engine.clone(),
            &service.connectivity,
            service.config.sync_interval(),
        );
        *service.scheduler.lock().await = Some(scheduler);
        Ok(service)
    }

    /// Open a store without a scheduler; passes run only through [`Self::sync_now`].
    pub async fn open_manual(
        config: StoreConfig,
        storage: Arc<dyn KeyValueStore>,
        delivery: Arc<dyn Delivery>,
        connectivity: Connectivity,
    ) -> Result<Self> {
        config.validate()?;

        let store = RecordStore::open(storage, config.storage_key.clone())
            .await?
            .with_quota(QuotaGuard::new(
                config.max_storage_size_bytes,
                config.eviction_percent,
            ));
        tracing::info!(
            "Opened offline store '{}' with {} record(s)",
            config.storage_key,
            store.len()
        );

        let store = Arc::new(Mutex::new(store));
        let hub = SubscriptionHub::new();
        let engine = SyncEngine::new(
            store.clone(),
            delivery,
            connectivity.clone(),
            hub.clone(),
            RetryPolicy::new(config.retry_threshold),
        );

        Ok(Self {
            config,
            store,
            engine,
            hub,
            connectivity,
            scheduler: Mutex::new(None),
        })
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Save a new record and return its id.
    ///
    /// When a scheduler is running and the device is online, a sync pass is
    /// requested in the background.
    pub async fn save_data(
        &self,
        record_type: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<RecordId> {
        let (id, notifications) = {
            let mut store = self.store.lock().await;
            let outcome = store.save(record_type, payload, priority).await?;
            let saved_type = store
                .get(&outcome.id)
                .map(|record| record.record_type.clone());
            let mut types: BTreeSet<String> = outcome
                .quota
                .evicted
                .iter()
                .map(|record| record.record_type.clone())
                .collect();
            types.extend(saved_type);
            let notifications = self.hub.prepare(&store, types.iter().map(String::as_str));
            (outcome.id, notifications)
        };
        self.hub.dispatch(notifications);
        tracing::debug!("Saved record {} ({}, {})", id, record_type, priority);

        self.request_background_sync().await;
        Ok(id)
    }

    /// All payloads of a type, newest first.
    pub async fn get_data(&self, record_type: &str) -> Vec<serde_json::Value> {
        self.store.lock().await.payloads_of_type(record_type)
    }

    /// One payload by id, if it exists and belongs to `record_type`.
    pub async fn get_data_by_id(
        &self,
        record_type: &str,
        id: &RecordId,
    ) -> Option<serde_json::Value> {
        self.store
            .lock()
            .await
            .get(id)
            .filter(|record| record.record_type == record_type)
            .map(|record| record.payload.clone())
    }

    /// Full record by id, including sync metadata.
    pub async fn get_record(&self, id: &RecordId) -> Option<Record> {
        self.store.lock().await.get(id).cloned()
    }

    /// Delete one record. Unknown ids are an error.
    pub async fn delete_data(&self, id: &RecordId) -> Result<()> {
        let notifications = {
            let mut store = self.store.lock().await;
            let removed = store.delete(id).await?;
            self.hub.prepare(&store, [removed.record_type.as_str()])
        };
        self.hub.dispatch(notifications);
        Ok(())
    }

    /// Delete every record of a type, returning how many were removed.
    pub async fn clear_data(&self, record_type: &str) -> Result<usize> {
        let (removed, notifications) = {
            let mut store = self.store.lock().await;
            let removed = store.clear_type(record_type).await?;
            (removed, self.hub.prepare(&store, [record_type]))
        };
        if removed > 0 {
            self.hub.dispatch(notifications);
        }
        Ok(removed)
    }

    /// Run a sync pass now. A no-op while offline or while a pass is running.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.engine.run_pass().await
    }

    /// Re-queue every conflicted record for another attempt.
    pub async fn retry_failed(&self) -> Result<usize> {
        let (affected, notifications) = {
            let mut store = self.store.lock().await;
            if !store.iter().any(Record::is_conflicted) {
                return Ok(0);
            }
            let affected = store.mutate(policy::requeue_conflicted).await?;
            let notifications = self
                .hub
                .prepare(&store, affected.record_types.iter().map(String::as_str));
            (affected, notifications)
        };
        self.hub.dispatch(notifications);
        tracing::info!("Re-queued {} conflicted record(s)", affected.len());
        self.request_background_sync().await;
        Ok(affected.len())
    }

    /// Apply `choice` to every conflicted record.
    pub async fn resolve_conflicts(&self, choice: ResolveChoice) -> Result<usize> {
        let (affected, notifications) = {
            let mut store = self.store.lock().await;
            if !store.iter().any(Record::is_conflicted) {
                return Ok(0);
            }
            let affected = store
                .mutate(|store| policy::resolve_conflicted(store, choice))
                .await?;
            let notifications = self
                .hub
                .prepare(&store, affected.record_types.iter().map(String::as_str));
            (affected, notifications)
        };
        self.hub.dispatch(notifications);
        tracing::info!(
            "Resolved {} conflicted record(s) with {:?}",
            affected.len(),
            choice
        );
        if choice == ResolveChoice::KeepLocal {
            self.request_background_sync().await;
        }
        Ok(affected.len())
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus> {
        self.engine.status().await
    }

    /// Pending records in the order the next pass will attempt them.
    pub async fn get_pending_items(&self) -> Vec<Record> {
        let store = self.store.lock().await;
        select_pending(store.iter()).into_iter().cloned().collect()
    }

    /// Pending records that have failed at least once, oldest first.
    pub async fn get_failed_items(&self) -> Vec<Record> {
        self.filtered(Record::has_failed).await
    }

    /// Conflicted records awaiting a decision, oldest first.
    pub async fn get_conflict_items(&self) -> Vec<Record> {
        self.filtered(Record::is_conflicted).await
    }

    async fn filtered(&self, keep: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.store
            .lock()
            .await
            .oldest_first()
            .into_iter()
            .filter(|record| keep(*record))
            .cloned()
            .collect()
    }

    /// Remove every record of every type, returning how many were removed.
    pub async fn clear_storage(&self) -> Result<usize> {
        let (count, notifications) = {
            let mut store = self.store.lock().await;
            let removed = store.clear_all().await?;
            let types: BTreeSet<&str> =
                removed.iter().map(|record| record.record_type.as_str()).collect();
            (removed.len(), self.hub.prepare(&store, types))
        };
        self.hub.dispatch(notifications);
        tracing::info!("Cleared offline storage ({} record(s))", count);
        Ok(count)
    }

    /// Register `callback` for changes to `record_type`.
    pub fn subscribe(
        &self,
        record_type: impl Into<String>,
        callback: impl Fn(&[serde_json::Value]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.hub.subscribe(record_type, callback)
    }

    pub fn unsubscribe(&self, record_type: &str, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(record_type, id)
    }

    /// Conflict and status events from sync passes
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.engine.events()
    }

    /// Stop the scheduler and drop every subscription. The store stays usable
    /// for direct calls.
    pub async fn destroy(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.shutdown().await;
        }
        self.hub.clear();
        tracing::debug!("Offline store '{}' destroyed", self.config.storage_key);
    }

    async fn request_background_sync(&self) {
        let scheduled = self.scheduler.lock().await.is_some();
        if !scheduled || !self.connectivity.is_online() {
            return;
        }
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.run_pass().await {
                tracing::warn!("Background sync pass failed: {}", error);
            }
        });
    }
}

impl std::fmt::Debug for OfflineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineStore")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}
