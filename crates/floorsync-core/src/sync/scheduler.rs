//! Scheduler: turns timer ticks and connectivity-restored transitions into
//! sync pass requests.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Connectivity, SyncEngine, SyncReport};

/// Background task driving an engine. Owns no record data.
#[derive(Debug)]
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the scheduler loop on the current tokio runtime.
    pub fn spawn(engine: SyncEngine, connectivity: &Connectivity, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut online_rx = connectivity.subscribe();
        online_rx.borrow_and_update();
        let connectivity = connectivity.clone();
        let mut seen_reconnects = connectivity.reconnects();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Sync scheduler started (interval {:?})", interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if engine.is_online() {
                            request_pass(&engine, "interval").await;
                        }
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            tracing::debug!("Connectivity signal dropped");
                            break;
                        }
                        // A flap during a pass is coalesced by the watch, so
                        // compare reconnect counts rather than the last value.
                        let online = *online_rx.borrow_and_update();
                        let reconnects = connectivity.reconnects();
                        if online && reconnects != seen_reconnects {
                            seen_reconnects = reconnects;
                            request_pass(&engine, "connectivity restored").await;
                        }
                    }
                }
            }

            tracing::info!("Sync scheduler stopped");
        });

        Self { shutdown, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop, letting an in-progress pass run to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.handle.await {
            tracing::warn!("Sync scheduler task ended abnormally: {}", error);
        }
    }
}

async fn request_pass(engine: &SyncEngine, trigger: &str) {
    match engine.run_pass().await {
        Ok(SyncReport::Completed(summary)) => {
            tracing::debug!(
                "Sync pass ({}) delivered {} of {} record(s)",
                trigger,
                summary.synced,
                summary.attempted
            );
        }
        Ok(SyncReport::Skipped(reason)) => {
            tracing::debug!("Sync pass ({}) skipped: {:?}", trigger, reason);
        }
        Err(error) => {
            tracing::warn!("Sync pass ({}) failed: {}", trigger, error);
        }
    }
}
