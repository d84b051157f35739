//! Derived sync status snapshot

use serde::{Deserialize, Serialize};

/// Snapshot of the store's sync health, computed on demand and never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending: usize,
    /// Pending records that have failed at least once
    pub failed: usize,
    pub conflicted: usize,
    pub synced: usize,
    pub total: usize,
    /// Current serialized size of the store in bytes
    pub storage_bytes: usize,
    /// Completion time of the last sync pass (Unix ms)
    pub last_sync_at: Option<i64>,
}
