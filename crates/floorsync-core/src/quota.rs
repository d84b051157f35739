//! Quota guard bounding the serialized size of the record store.

use crate::models::{Record, RecordId};
use crate::store::RecordStore;
use crate::Result;

/// Outcome of one quota check.
#[derive(Debug, Clone, Default)]
pub struct QuotaReport {
    /// Serialized size before eviction
    pub before_bytes: usize,
    /// Serialized size after eviction (equal to `before_bytes` when nothing ran)
    pub after_bytes: usize,
    /// Records removed, oldest first
    pub evicted: Vec<Record>,
    /// The ceiling is still exceeded after the eviction pass
    pub overflow: bool,
}

impl QuotaReport {
    pub fn evicted_ids(&self) -> Vec<RecordId> {
        self.evicted.iter().map(|record| record.id).collect()
    }
}

/// Evicts the oldest share of records when the store outgrows its ceiling.
///
/// A single eviction pass runs per check. If the store is still too large
/// afterwards the overflow is logged and left in place so a burst of records
/// cannot empty the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaGuard {
    ceiling_bytes: usize,
    eviction_percent: u8,
}

impl QuotaGuard {
    pub const fn new(ceiling_bytes: usize, eviction_percent: u8) -> Self {
        Self {
            ceiling_bytes,
            eviction_percent,
        }
    }

    pub const fn ceiling_bytes(&self) -> usize {
        self.ceiling_bytes
    }

    /// Number of records one eviction pass removes from a store of `len` records.
    pub fn eviction_count(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (len * usize::from(self.eviction_percent)).div_ceil(100).max(1)
    }

    /// Measure the store and evict if it exceeds the ceiling.
    ///
    /// Records in the running sync pass's working set are never evicted, and
    /// neither is `keep` (the record currently being saved).
    pub fn enforce(&self, store: &mut RecordStore, keep: Option<RecordId>) -> Result<QuotaReport> {
        let before_bytes = store.serialized_len()?;
        if before_bytes <= self.ceiling_bytes {
            return Ok(QuotaReport {
                before_bytes,
                after_bytes: before_bytes,
                ..QuotaReport::default()
            });
        }

        let mut candidates: Vec<(i64, u64, RecordId)> = store
            .iter()
            .filter(|record| Some(record.id) != keep && !store.is_in_flight(&record.id))
            .map(|record| (record.created_at, record.sequence, record.id))
            .collect();
        candidates.sort_unstable();

        let evicted: Vec<Record> = candidates
            .into_iter()
            .take(self.eviction_count(store.len()))
            .filter_map(|(_, _, id)| store.remove(&id))
            .collect();

        let after_bytes = store.serialized_len()?;
        let overflow = after_bytes > self.ceiling_bytes;

        tracing::info!(
            "Quota exceeded ({} > {} bytes): evicted {} oldest record(s), now {} bytes",
            before_bytes,
            self.ceiling_bytes,
            evicted.len(),
            after_bytes
        );
        if overflow {
            tracing::warn!(
                "Storage overflow: {} bytes still exceeds the {} byte ceiling after eviction",
                after_bytes,
                self.ceiling_bytes
            );
        }

        Ok(QuotaReport {
            before_bytes,
            after_bytes,
            evicted,
            overflow,
        })
    }
}
