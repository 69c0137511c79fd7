//! Background tasks.
//!
//! [`Sweeper`] periodically purges expired cache entries. Lookups already
//! treat expired entries as absent, so sweeping only bounds memory held by
//! keys that are never requested again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::cache::Storage;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running purge task. Dropping it stops the task.
#[derive(Debug)]
pub struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns a task on the current Tokio runtime that calls
    /// [`Storage::purge_expired`] every `every` (at least 10ms).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(store: Arc<dyn Storage>, every: Duration) -> Self {
        let every = every.max(MIN_SWEEP_INTERVAL);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = store.len(), "swept expired cache entries");
                }
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
