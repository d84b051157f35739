//! Subscription hub: pushes the current payload list of a record type to
//! observers whenever that type changes.

use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::store::RecordStore;

type Callback = Arc<dyn Fn(&[serde_json::Value]) + Send + Sync>;

/// Handle returned by [`SubscriptionHub::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<String, Vec<(SubscriptionId, Callback)>>,
}

/// A type's payload list captured under the store lock, delivered after it is released.
#[derive(Debug, Clone)]
pub struct Notification {
    pub record_type: String,
    pub payloads: Vec<serde_json::Value>,
}

/// Registry of per-type observers
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    state: Arc<Mutex<HubState>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for changes to `record_type`.
    pub fn subscribe(
        &self,
        record_type: impl Into<String>,
        callback: impl Fn(&[serde_json::Value]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state
            .subscribers
            .entry(record_type.into())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns whether it was registered.
    pub fn unsubscribe(&self, record_type: &str, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let Some(callbacks) = state.subscribers.get_mut(record_type) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            state.subscribers.remove(record_type);
        }
        removed
    }

    pub fn subscriber_count(&self, record_type: &str) -> usize {
        self.lock().subscribers.get(record_type).map_or(0, Vec::len)
    }

    /// Drop every subscription
    pub fn clear(&self) {
        self.lock().subscribers.clear();
    }

    /// Capture the payload lists for `record_types` that have subscribers.
    pub fn prepare<'a>(
        &self,
        store: &RecordStore,
        record_types: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Notification> {
        let types: BTreeSet<&str> = record_types.into_iter().collect();
        let state = self.lock();
        types
            .into_iter()
            .filter(|record_type| state.subscribers.contains_key(*record_type))
            .map(|record_type| Notification {
                record_type: record_type.to_string(),
                payloads: store.payloads_of_type(record_type),
            })
            .collect()
    }

    /// Invoke subscribers for each prepared notification.
    pub fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.notify(&notification.record_type, &notification.payloads);
        }
    }

    /// Invoke every callback registered for `record_type`, returning how many ran
    /// to completion. A panicking callback is logged and does not stop the rest.
    pub fn notify(&self, record_type: &str, payloads: &[serde_json::Value]) -> usize {
        let callbacks: Vec<(SubscriptionId, Callback)> = self
            .lock()
            .subscribers
            .get(record_type)
            .cloned()
            .unwrap_or_default();

        let mut completed = 0;
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(payloads))).is_ok() {
                completed += 1;
            } else {
                tracing::warn!(
                    "Subscriber {:?} for '{}' panicked while handling a change",
                    id,
                    record_type
                );
            }
        }
        completed
    }
}

impl std::fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        let mut types: Vec<&String> = state.subscribers.keys().collect();
        types.sort();
        f.debug_struct("SubscriptionHub")
            .field("record_types", &types)
            .finish()
    }
}
