//! Synchronization: delivery of pending records while connectivity flaps.
//!
//! - [`policy`] decides what a delivery outcome does to a record.
//! - [`SyncEngine`] runs one pass over the pending records.
//! - [`Scheduler`] triggers passes on an interval and when connectivity returns.
//! - [`Delivery`] and [`Connectivity`] are the injected collaborators.

mod connectivity;
mod delivery;
mod engine;
mod events;
pub mod policy;
mod scheduler;

pub use connectivity::Connectivity;
pub use delivery::{Delivery, DeliveryError, DeliveryRouter};
pub use engine::{PassSummary, SkipReason, SyncEngine, SyncReport};
pub use events::SyncEvent;
pub use policy::{DeliveryOutcome, ResolveChoice, RetryPolicy, Transition};
pub use scheduler::Scheduler;
