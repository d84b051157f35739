//! In-memory key-value store for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::Result;

/// Shared in-memory byte store.
///
/// Clones share the same entries, which lets tests reopen a store against the
/// same "disk" to simulate a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the blob stored under `key`, if any.
    pub async fn stored_len(&self, key: &str) -> Option<usize> {
        self.entries.lock().await.get(key).map(Vec::len)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
