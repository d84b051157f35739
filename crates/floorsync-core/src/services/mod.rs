//! Services shared across clients.

mod offline_store;

pub use offline_store::OfflineStore;
