//! Online/offline signal.
//!
//! The host's reachability check owns a [`Connectivity`] and calls
//! [`Connectivity::set_online`]; the engine reads the current value and the
//! scheduler watches for transitions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Shared boolean "is the network reachable" signal
#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
    /// Count of offline -> online transitions; survives watch coalescing.
    reconnects: Arc<AtomicU64>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _receiver) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
            reconnects: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Update the signal, returning whether the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                if online {
                    self.reconnects.fetch_add(1, Ordering::AcqRel);
                }
                true
            }
        });
        if changed {
            tracing::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    /// Number of times the signal went from offline to online
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Receiver notified on every online/offline transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
