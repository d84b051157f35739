//! Persistent key-value capability used by the record store.
//!
//! The store writes its whole state as one serialized blob under a single key,
//! so implementations only need whole-value `load`/`save`. Implementations must
//! make `save` all-or-nothing: a reader never observes a partially written blob.

mod file;
mod memory;

use async_trait::async_trait;

use crate::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Dumb byte store the record store persists into.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Load the bytes stored under `key`, or `None` when nothing was saved yet.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`.
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
}
