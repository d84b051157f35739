//! Data models for floorsync

mod record;
mod status;

pub use record::{Priority, Record, RecordId, SyncState};
pub use status::SyncStatus;
