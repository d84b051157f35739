//! floorsync-core - Core library for floorsync
//!
//! This crate contains the offline-first synchronization engine used by the
//! factory floor dashboard: the persisted record store, the quota guard, the
//! sync engine with its retry policy and scheduler, and the subscription hub
//! that pushes changes to observers.

pub mod config;
pub mod error;
pub mod hub;
pub mod models;
pub mod quota;
pub mod services;
pub mod storage;
pub mod store;
pub mod sync;
pub mod util;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use hub::{SubscriptionHub, SubscriptionId};
pub use models::{Priority, Record, RecordId, SyncState, SyncStatus};
pub use services::OfflineStore;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{
    Connectivity, Delivery, DeliveryError, DeliveryRouter, ResolveChoice, SyncEvent, SyncReport,
};
