//! Record store: the in-memory index of records backed by one persisted blob.
//!
//! Every mutating call rewrites the whole blob before returning. If that write
//! fails the in-memory state is rolled back, so the persisted blob and the
//! index never disagree about a mutation the caller was told succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{Priority, Record, RecordId};
use crate::quota::{QuotaGuard, QuotaReport};
use crate::storage::KeyValueStore;
use crate::util::normalize_text_option;
use crate::{Error, Result};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    records: Vec<&'a Record>,
}

#[derive(Deserialize)]
struct Envelope {
    format_version: u32,
    records: Vec<Record>,
}

/// Result of a successful `save`
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub id: RecordId,
    pub quota: QuotaReport,
}

/// In-memory state captured before a mutation so it can be restored.
struct Snapshot {
    records: HashMap<RecordId, Record>,
    next_sequence: u64,
}

/// Persisted index of all records
pub struct RecordStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    records: HashMap<RecordId, Record>,
    next_sequence: u64,
    /// Working set of the running sync pass
    in_flight: HashSet<RecordId>,
    quota: QuotaGuard,
}

impl RecordStore {
    /// Load the store persisted under `key`, or start empty when nothing was saved.
    ///
    /// The quota guard starts unbounded; use [`RecordStore::with_quota`] to set it.
    pub async fn open(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let records = match storage.load(&key).await? {
            Some(bytes) => decode(&bytes)?,
            None => Vec::new(),
        };

        let next_sequence = records
            .iter()
            .map(|record| record.sequence)
            .max()
            .map_or(1, |max| max + 1);
        let records: HashMap<RecordId, Record> = records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        tracing::debug!("Opened record store '{}' with {} record(s)", key, records.len());

        Ok(Self {
            storage,
            key,
            records,
            next_sequence,
            in_flight: HashSet::new(),
            quota: QuotaGuard::new(usize::MAX, 10),
        })
    }

    /// Set the quota guard applied on every save
    #[must_use]
    pub const fn with_quota(mut self, quota: QuotaGuard) -> Self {
        self.quota = quota;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    /// Insert a record in memory only, assigning its insertion sequence.
    pub fn insert(&mut self, mut record: Record) -> RecordId {
        record.sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = record.id;
        self.records.insert(id, record);
        id
    }

    /// Remove a record in memory only.
    pub fn remove(&mut self, id: &RecordId) -> Option<Record> {
        self.records.remove(id)
    }

    /// All records, oldest first
    pub fn oldest_first(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.values().collect();
        records.sort_by_key(|record| record.age_key());
        records
    }

    /// Records of one type, newest first
    pub fn records_of_type(&self, record_type: &str) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .records
            .values()
            .filter(|record| record.record_type == record_type)
            .collect();
        records.sort_by_key(|record| std::cmp::Reverse(record.age_key()));
        records
    }

    /// Payloads of one type, newest first
    pub fn payloads_of_type(&self, record_type: &str) -> Vec<serde_json::Value> {
        self.records_of_type(record_type)
            .into_iter()
            .map(|record| record.payload.clone())
            .collect()
    }

    pub fn is_in_flight(&self, id: &RecordId) -> bool {
        self.in_flight.contains(id)
    }

    /// Mark ids as the running pass's working set
    pub fn mark_in_flight(&mut self, ids: &[RecordId]) {
        self.in_flight.extend(ids.iter().copied());
    }

    pub fn clear_in_flight(&mut self) {
        self.in_flight.clear();
    }

    /// Serialize the whole store
    pub fn encode(&self) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            format_version: FORMAT_VERSION,
            records: self.oldest_first(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Serialized size of the whole store in bytes
    pub fn serialized_len(&self) -> Result<usize> {
        self.encode().map(|bytes| bytes.len())
    }

    /// Write the whole store, returning the number of bytes written.
    pub async fn persist(&self) -> Result<usize> {
        let bytes = self.encode()?;
        self.storage.save(&self.key, &bytes).await?;
        Ok(bytes.len())
    }

    /// Create a pending record, run the quota guard, and persist.
    pub async fn save(
        &mut self,
        record_type: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<SaveOutcome> {
        let record_type = normalize_text_option(Some(record_type.to_string()))
            .ok_or_else(|| Error::InvalidInput("record type must not be empty".to_string()))?;

        let snapshot = self.snapshot();
        let id = self.insert(Record::new(record_type, payload, priority));
        let guard = self.quota;
        let quota = match guard.enforce(self, Some(id)) {
            Ok(report) => report,
            Err(error) => {
                self.restore(snapshot);
                return Err(error);
            }
        };
        self.commit(snapshot).await?;
        Ok(SaveOutcome { id, quota })
    }

    /// Remove one record and persist. Unknown ids are an error.
    pub async fn delete(&mut self, id: &RecordId) -> Result<Record> {
        let snapshot = self.snapshot();
        let removed = self
            .records
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.commit(snapshot).await?;
        Ok(removed)
    }

    /// Remove every record of a type in one persisted write.
    pub async fn clear_type(&mut self, record_type: &str) -> Result<usize> {
        let snapshot = self.snapshot();
        let before = self.records.len();
        self.records
            .retain(|_, record| record.record_type != record_type);
        let removed = before - self.records.len();
        if removed == 0 {
            return Ok(0);
        }
        self.commit(snapshot).await?;
        Ok(removed)
    }

    /// Remove every record and persist the empty store.
    pub async fn clear_all(&mut self) -> Result<Vec<Record>> {
        let snapshot = self.snapshot();
        let removed: Vec<Record> = self.records.drain().map(|(_, record)| record).collect();
        self.commit(snapshot).await?;
        Ok(removed)
    }

    /// Apply `mutate` to the records and persist, rolling back if the write fails.
    pub async fn mutate<T>(&mut self, mutate: impl FnOnce(&mut Self) -> T) -> Result<T> {
        let snapshot = self.snapshot();
        let value = mutate(self);
        self.commit(snapshot).await?;
        Ok(value)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records.clone(),
            next_sequence: self.next_sequence,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.records = snapshot.records;
        self.next_sequence = snapshot.next_sequence;
    }

    async fn commit(&mut self, snapshot: Snapshot) -> Result<()> {
        match self.persist().await {
            Ok(_) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    "Persisting record store '{}' failed, rolling back: {}",
                    self.key,
                    error
                );
                self.restore(snapshot);
                Err(error)
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<Record>> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|error| Error::Corrupted(error.to_string()))?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(Error::Corrupted(format!(
            "unsupported format_version {} (expected {})",
            envelope.format_version, FORMAT_VERSION
        )));
    }
    Ok(envelope.records)
}
