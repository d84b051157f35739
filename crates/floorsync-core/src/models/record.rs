//! Record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::unix_millis_now;

/// A unique identifier for a record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Delivery priority of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// All priorities, lowest first
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Lowercase name as stored
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown priority '{s}'"))
    }
}

/// Synchronization state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Waiting for delivery
    Pending,
    /// Delivered; never re-queued
    Synced,
    /// Retry budget exhausted; waits for an explicit decision
    Conflicted,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflicted => "conflicted",
        }
    }
}

/// One unit of offline-persisted data with its sync metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    /// Caller-supplied category (e.g. `job_update`, `andon_event`)
    pub record_type: String,
    /// Opaque caller data, returned unmodified
    pub payload: serde_json::Value,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Bumped whenever the record is re-queued by an external decision
    pub version: u32,
    pub priority: Priority,
    pub sync_state: SyncState,
    /// Consecutive failed delivery attempts since last success or reset
    pub retry_count: u32,
    /// Store-assigned insertion counter, breaks `created_at` ties
    #[serde(default)]
    pub sequence: u64,
    /// Message of the most recent delivery failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Record {
    /// Create a new pending record
    #[must_use]
    pub fn new(
        record_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: RecordId::new(),
            record_type: record_type.into(),
            payload,
            created_at: unix_millis_now(),
            version: 1,
            priority,
            sync_state: SyncState::Pending,
            retry_count: 0,
            sequence: 0,
            last_error: None,
        }
    }

    /// Sort key for age ordering, oldest first
    #[must_use]
    pub const fn age_key(&self) -> (i64, u64) {
        (self.created_at, self.sequence)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        self.sync_state == SyncState::Conflicted
    }

    /// Pending but has failed at least once
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.is_pending() && self.retry_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_unique() {
        let id1 = RecordId::new();
        let id2 = RecordId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_record_new() {
        let record = Record::new("job_update", json!({"job": 42}), Priority::High);
        assert_eq!(record.record_type, "job_update");
        assert_eq!(record.version, 1);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.sync_state, SyncState::Pending);
        assert!(record.created_at > 0);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!(" LOW ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Priority::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&SyncState::Conflicted).unwrap(),
            "\"conflicted\""
        );
    }

    #[test]
    fn test_has_failed() {
        let mut record = Record::new("andon_event", json!(null), Priority::Low);
        assert!(!record.has_failed());
        record.retry_count = 1;
        assert!(record.has_failed());
        record.sync_state = SyncState::Conflicted;
        assert!(!record.has_failed());
    }
}
