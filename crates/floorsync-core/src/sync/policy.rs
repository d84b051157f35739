//! Conflict/retry policy.
//!
//! Pure decisions over records: the selection order of a pass, what a delivery
//! outcome does to a record, and how conflicted records are re-queued or
//! discarded on an explicit decision.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{Priority, Record, RecordId, SyncState};
use crate::store::RecordStore;

/// Sync ordering rank per priority, indexed by declaration order (low first).
const PRIORITY_RANKS: [u8; 4] = [1, 2, 3, 4];

/// Rank used by the selection step: critical=4 > high=3 > medium=2 > low=1
pub const fn priority_rank(priority: Priority) -> u8 {
    PRIORITY_RANKS[priority as usize]
}

/// Order two records for delivery: higher rank first, then oldest first.
pub fn selection_order(a: &Record, b: &Record) -> Ordering {
    priority_rank(b.priority)
        .cmp(&priority_rank(a.priority))
        .then_with(|| a.age_key().cmp(&b.age_key()))
}

/// Pending records in the order a pass attempts them.
pub fn select_pending<'a>(records: impl Iterator<Item = &'a Record>) -> Vec<&'a Record> {
    let mut pending: Vec<&Record> = records.filter(|record| record.is_pending()).collect();
    pending.sort_by(|a, b| selection_order(a, b));
    pending
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

/// State change a delivery outcome caused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Synced,
    /// Still pending, with the new retry count
    Retrying(u32),
    Conflicted,
}

/// External decision for conflicted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveChoice {
    /// Drop the local copy
    DiscardLocal,
    /// Keep the local copy and queue it for another attempt
    KeepLocal,
}

/// Retry-threshold rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

impl RetryPolicy {
    pub const fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Apply a delivery outcome to a pending record.
    pub fn apply(&self, record: &mut Record, outcome: &DeliveryOutcome) -> Transition {
        match outcome {
            DeliveryOutcome::Delivered => {
                record.sync_state = SyncState::Synced;
                record.retry_count = 0;
                record.last_error = None;
                Transition::Synced
            }
            DeliveryOutcome::Failed(message) => {
                record.retry_count = record.retry_count.saturating_add(1);
                record.last_error = Some(message.clone());
                if record.retry_count >= self.threshold {
                    record.sync_state = SyncState::Conflicted;
                    Transition::Conflicted
                } else {
                    Transition::Retrying(record.retry_count)
                }
            }
        }
    }
}

/// Reset a record to pending for another attempt
pub fn requeue(record: &mut Record) {
    record.sync_state = SyncState::Pending;
    record.retry_count = 0;
    record.last_error = None;
    record.version = record.version.saturating_add(1);
}

/// Records touched by a bulk decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affected {
    pub ids: Vec<RecordId>,
    pub record_types: BTreeSet<String>,
}

impl Affected {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    fn push(&mut self, record: &Record) {
        self.ids.push(record.id);
        self.record_types.insert(record.record_type.clone());
    }
}

fn conflicted_ids(store: &RecordStore) -> Vec<RecordId> {
    store
        .oldest_first()
        .into_iter()
        .filter(|record| record.is_conflicted())
        .map(|record| record.id)
        .collect()
}

/// Re-queue every conflicted record as pending (in memory only).
pub fn requeue_conflicted(store: &mut RecordStore) -> Affected {
    let mut affected = Affected::default();
    for id in conflicted_ids(store) {
        if let Some(record) = store.get_mut(&id) {
            requeue(record);
            affected.push(record);
        }
    }
    affected
}

/// Apply `choice` to every conflicted record (in memory only).
pub fn resolve_conflicted(store: &mut RecordStore, choice: ResolveChoice) -> Affected {
    let mut affected = Affected::default();
    for id in conflicted_ids(store) {
        match choice {
            ResolveChoice::DiscardLocal => {
                if let Some(record) = store.remove(&id) {
                    affected.push(&record);
                }
            }
            ResolveChoice::KeepLocal => {
                if let Some(record) = store.get_mut(&id) {
                    requeue(record);
                    affected.push(record);
                }
            }
        }
    }
    affected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn record(priority: Priority, created_at: i64, sequence: u64) -> Record {
        let mut record = Record::new("job_update", json!(sequence), priority);
        record.created_at = created_at;
        record.sequence = sequence;
        record
    }

    #[test]
    fn ranks_follow_priority() {
        assert_eq!(priority_rank(Priority::Critical), 4);
        assert_eq!(priority_rank(Priority::High), 3);
        assert_eq!(priority_rank(Priority::Medium), 2);
        assert_eq!(priority_rank(Priority::Low), 1);
    }

    #[test]
    fn selection_is_priority_then_age() {
        let records = [
            record(Priority::Low, 10, 1),
            record(Priority::Critical, 30, 2),
            record(Priority::Medium, 20, 3),
            record(Priority::Critical, 5, 4),
            record(Priority::Medium, 20, 0),
        ];

        let order: Vec<u64> = select_pending(records.iter())
            .into_iter()
            .map(|record| record.sequence)
            .collect();

        assert_eq!(order, vec![4, 2, 0, 3, 1]);
    }

    #[test]
    fn selection_skips_non_pending() {
        let mut synced = record(Priority::Critical, 1, 1);
        synced.sync_state = SyncState::Synced;
        let mut conflicted = record(Priority::Critical, 1, 2);
        conflicted.sync_state = SyncState::Conflicted;
        let pending = record(Priority::Low, 1, 3);
        let records = [synced, conflicted, pending];

        let selected = select_pending(records.iter());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].sequence, 3);
    }

    #[test]
    fn failures_below_threshold_stay_pending() {
        let policy = RetryPolicy::default();
        let mut record = record(Priority::Low, 1, 1);
        let failed = DeliveryOutcome::Failed("timeout".to_string());

        assert_eq!(policy.apply(&mut record, &failed), Transition::Retrying(1));
        assert_eq!(policy.apply(&mut record, &failed), Transition::Retrying(2));
        assert_eq!(record.sync_state, SyncState::Pending);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));

        assert_eq!(policy.apply(&mut record, &failed), Transition::Conflicted);
        assert_eq!(record.sync_state, SyncState::Conflicted);
        assert_eq!(record.retry_count, 3);
    }

    #[test]
    fn success_resets_retry_count() {
        let policy = RetryPolicy::new(5);
        let mut record = record(Priority::High, 1, 1);
        policy.apply(&mut record, &DeliveryOutcome::Failed("503".to_string()));

        assert_eq!(
            policy.apply(&mut record, &DeliveryOutcome::Delivered),
            Transition::Synced
        );
        assert_eq!(record.retry_count, 0);
        assert!(record.last_error.is_none());
    }

    async fn store_with_conflicts() -> (RecordStore, RecordId, RecordId) {
        let mut store = RecordStore::open(Arc::new(MemoryStore::new()), "records")
            .await
            .unwrap();
        let mut conflicted = record(Priority::Low, 1, 0);
        conflicted.sync_state = SyncState::Conflicted;
        conflicted.retry_count = 3;
        conflicted.record_type = "andon_event".to_string();
        let conflicted_id = store.insert(conflicted);
        let pending_id = store.insert(record(Priority::Low, 2, 0));
        (store, conflicted_id, pending_id)
    }

    #[tokio::test]
    async fn requeue_conflicted_resets_and_bumps_version() {
        let (mut store, conflicted_id, pending_id) = store_with_conflicts().await;

        let affected = requeue_conflicted(&mut store);

        assert_eq!(affected.ids, vec![conflicted_id]);
        assert!(affected.record_types.contains("andon_event"));
        let record = store.get(&conflicted_id).unwrap();
        assert_eq!(record.sync_state, SyncState::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.version, 2);
        assert_eq!(store.get(&pending_id).unwrap().version, 1);
    }

    #[tokio::test]
    async fn discard_local_is_idempotent() {
        let (mut store, conflicted_id, _) = store_with_conflicts().await;

        let first = resolve_conflicted(&mut store, ResolveChoice::DiscardLocal);
        let second = resolve_conflicted(&mut store, ResolveChoice::DiscardLocal);

        assert_eq!(first.ids, vec![conflicted_id]);
        assert!(second.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn keep_local_requeues() {
        let (mut store, conflicted_id, _) = store_with_conflicts().await;

        let affected = resolve_conflicted(&mut store, ResolveChoice::KeepLocal);

        assert_eq!(affected.len(), 1);
        assert!(store.get(&conflicted_id).unwrap().is_pending());
    }
}
