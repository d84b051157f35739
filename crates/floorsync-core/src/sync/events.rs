//! Events broadcast by the sync engine.

use crate::models::{RecordId, SyncStatus};

/// Capacity of the event broadcast channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted during or after a sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A record exhausted its retry budget and needs an explicit decision
    Conflict { id: RecordId, record_type: String },
    /// Status snapshot computed at the end of a pass
    Status(SyncStatus),
}
