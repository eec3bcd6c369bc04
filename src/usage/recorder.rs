//! Usage side effect of a completed forward.
//!
//! # Responsibilities
//! - Increment the registry for the destination that was served
//! - Hand the new count to the store without blocking the relay
//! - Log misses and persistence failures; never surface them to clients
//! - Let shutdown wait for writes that are still in flight

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;

use crate::observability::metrics;
use crate::store::UsageStore;
use crate::usage::registry::UsageRegistry;

/// Applies the count increment and write-through for forwarded requests.
#[derive(Clone)]
pub struct UsageRecorder {
    registry: Arc<UsageRegistry>,
    store: Arc<dyn UsageStore>,
    persist_timeout: Duration,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl UsageRecorder {
    pub fn new(
        registry: Arc<UsageRegistry>,
        store: Arc<dyn UsageStore>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            persist_timeout,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn registry(&self) -> &Arc<UsageRegistry> {
        &self.registry
    }

    /// Count one completed forward to `identifier`.
    ///
    /// Returns the new count, or `None` for an unregistered destination. The
    /// store write runs on its own task; this call never waits on it.
    pub fn record(&self, identifier: u32) -> Option<u64> {
        let Some(count) = self.registry.increment(identifier) else {
            tracing::warn!(port = identifier, "App for port not found, usage not tracked");
            metrics::record_usage_miss();
            return None;
        };

        metrics::record_usage_increment();
        tracing::debug!(port = identifier, count, "Usage count incremented");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let recorder = self.clone();
                let mut pending = self.pending.lock().expect("pending writes mutex poisoned");
                while pending.try_join_next().is_some() {}
                pending.spawn_on(
                    async move {
                        recorder.persist(identifier, count).await;
                    },
                    &handle,
                );
            }
            Err(_) => {
                tracing::error!(port = identifier, count, "No runtime available, count not persisted");
                metrics::record_persist_failure();
            }
        }

        Some(count)
    }

    /// Wait for store writes still in flight, bounded by the persist timeout.
    ///
    /// Returns how many writes were abandoned.
    pub async fn drain(&self) -> usize {
        let mut pending =
            std::mem::take(&mut *self.pending.lock().expect("pending writes mutex poisoned"));
        if pending.is_empty() {
            return 0;
        }

        let waiting = pending.len();
        let drained = tokio::time::timeout(self.persist_timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                tracing::info!(writes = waiting, "Pending count writes flushed");
                0
            }
            Err(_) => {
                let abandoned = pending.len();
                tracing::error!(
                    abandoned,
                    timeout = ?self.persist_timeout,
                    "Pending count writes did not finish before shutdown"
                );
                abandoned
            }
        }
    }

    /// Write `count` for `identifier`, bounded by the persist timeout.
    ///
    /// Returns whether the write landed. Failures are logged here.
    pub async fn persist(&self, identifier: u32, count: u64) -> bool {
        let write = self.store.upsert_count(identifier, count);
        match tokio::time::timeout(self.persist_timeout, write).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(port = identifier, count, error = %e, "Error updating stored count");
                metrics::record_persist_failure();
                false
            }
            Err(_) => {
                tracing::error!(
                    port = identifier,
                    count,
                    timeout = ?self.persist_timeout,
                    "Timed out updating stored count"
                );
                metrics::record_persist_failure();
                false
            }
        }
    }
}
