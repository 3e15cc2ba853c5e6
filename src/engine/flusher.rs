use super::stats::StatsCounters;
use crate::core::{EntityKind, FLUSH_AMOUNT, IMPRESSIONS_COLUMN, ImpressionError, Result};
use crate::durable::DurableStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Outcome of one flush batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Applies durable increments for a set of flush units.
///
/// Every unit is spawned right away, but one semaphore sized to the worker
/// budget, shared by all batches, caps how many sit inside the durable store
/// at once. Units report success on a completion channel; failures are
/// logged and dropped.
pub struct BoundedFlusher {
    durable: Arc<dyn DurableStore>,
    worker_budget: usize,
    permits: Arc<Semaphore>,
    durable_timeout: Duration,
    stats: Arc<StatsCounters>,
}

impl BoundedFlusher {
    pub(crate) fn new(
        durable: Arc<dyn DurableStore>,
        worker_budget: usize,
        durable_timeout: Duration,
        stats: Arc<StatsCounters>,
    ) -> Self {
        let worker_budget = worker_budget.max(1);
        Self {
            durable,
            worker_budget,
            permits: Arc::new(Semaphore::new(worker_budget)),
            durable_timeout,
            stats,
        }
    }

    pub fn worker_budget(&self) -> usize {
        self.worker_budget
    }

    /// Flush every id once and wait for all units to settle.
    ///
    /// Only returns after the completion channel is drained and every unit
    /// task has been joined, so nothing from this batch outlives the call.
    pub async fn flush(&self, kind: EntityKind, ids: Vec<String>) -> FlushReport {
        if ids.is_empty() {
            return FlushReport::default();
        }

        let dispatched = ids.len();
        StatsCounters::add(&self.stats.flushes_dispatched, dispatched as u64);

        let (done_tx, mut done_rx) = mpsc::channel::<String>(self.worker_budget);
        let mut units = JoinSet::new();

        for id in ids {
            let durable = Arc::clone(&self.durable);
            let permits = Arc::clone(&self.permits);
            let done_tx = done_tx.clone();
            let durable_timeout = self.durable_timeout;

            units.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };

                match flush_unit(durable.as_ref(), kind, &id, durable_timeout).await {
                    Ok(()) => {
                        let _ = done_tx.send(id).await;
                    }
                    Err(err) => {
                        error!(
                            target: "impression_routines",
                            kind = %kind,
                            entity_id = %id,
                            error = %err,
                            "Error updating {} impression count",
                            kind
                        );
                    }
                }
            });
        }
        drop(done_tx);

        let mut completed = 0usize;
        while done_rx.recv().await.is_some() {
            completed += 1;
        }

        while let Some(joined) = units.join_next().await {
            if let Err(err) = joined {
                warn!(kind = %kind, error = %err, "flush unit did not run to completion");
            }
        }

        let failed = dispatched - completed;
        StatsCounters::add(&self.stats.flushes_completed, completed as u64);
        StatsCounters::add(&self.stats.flushes_failed, failed as u64);
        debug!(kind = %kind, dispatched, completed, failed, "impression flush settled");

        FlushReport {
            dispatched,
            completed,
            failed,
        }
    }
}

async fn flush_unit(
    durable: &dyn DurableStore,
    kind: EntityKind,
    id: &str,
    durable_timeout: Duration,
) -> Result<()> {
    timeout(
        durable_timeout,
        durable.add_to_column(kind.table(), id, IMPRESSIONS_COLUMN, FLUSH_AMOUNT),
    )
    .await
    .map_err(|_| ImpressionError::Timeout(durable_timeout.as_millis() as u64))?
}
