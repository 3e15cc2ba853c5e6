use super::pipeline::ImpressionPipeline;
use super::stats::StatsCounters;
use crate::core::{EntityKind, ImpressionError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{info, warn};

/// Ids of one listing response, already extracted from their entities
#[derive(Debug, Clone)]
pub(crate) struct RecordBatch {
    pub(crate) kind: EntityKind,
    pub(crate) ids: Vec<String>,
}

/// Background worker owning the batch queue.
///
/// Each queued batch runs its recorder pass and flush as its own task, so a
/// slow durable store only delays that batch.
pub(crate) struct ImpressionWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
    stats: Arc<StatsCounters>,
}

impl ImpressionWorker {
    /// Stop accepting batches, finish queued and in-flight ones, and wait up
    /// to `grace` for that to happen. Work still running afterwards is aborted.
    pub(crate) async fn stop(mut self, grace: Duration) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let Some(mut join_handle) = self.join_handle.take() else {
            return Ok(());
        };

        match timeout(grace, &mut join_handle).await {
            Ok(joined) => {
                joined?;
                info!("impression worker stopped");
                Ok(())
            }
            Err(_) => {
                let aborted = self.in_flight.load(Ordering::SeqCst);
                StatsCounters::add(&self.stats.batches_aborted, aborted as u64);
                join_handle.abort();
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    batches_aborted = aborted,
                    "impression worker aborted after grace period"
                );
                Err(ImpressionError::Timeout(grace.as_millis() as u64))
            }
        }
    }
}

impl Drop for ImpressionWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the worker onto the current tokio runtime.
pub(crate) fn spawn_impression_worker(
    pipeline: Arc<ImpressionPipeline>,
    queue_capacity: usize,
    stats: Arc<StatsCounters>,
) -> (mpsc::Sender<RecordBatch>, ImpressionWorker) {
    let (queue_tx, queue_rx) = mpsc::channel::<RecordBatch>(queue_capacity.max(1));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let in_flight = Arc::new(AtomicUsize::new(0));

    let join_handle = tokio::spawn(run_worker(pipeline, queue_rx, stop_rx, Arc::clone(&in_flight)));
    info!(queue_capacity, "impression worker started");

    (
        queue_tx,
        ImpressionWorker {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
            in_flight,
            stats,
        },
    )
}

async fn run_worker(
    pipeline: Arc<ImpressionPipeline>,
    mut queue_rx: mpsc::Receiver<RecordBatch>,
    mut stop_rx: oneshot::Receiver<()>,
    running: Arc<AtomicUsize>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            received = queue_rx.recv() => match received {
                Some(batch) => {
                    let pipeline = Arc::clone(&pipeline);
                    in_flight.spawn(async move { pipeline.process(batch).await; });
                    running.store(in_flight.len(), Ordering::SeqCst);
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                running.store(in_flight.len(), Ordering::SeqCst);
                if let Err(err) = joined {
                    warn!(error = %err, "impression batch task failed");
                }
            }
        }
    }

    // Drain whatever was queued before the stop signal.
    queue_rx.close();
    while let Some(batch) = queue_rx.recv().await {
        let pipeline = Arc::clone(&pipeline);
        in_flight.spawn(async move { pipeline.process(batch).await; });
        running.store(in_flight.len(), Ordering::SeqCst);
    }

    while let Some(joined) = in_flight.join_next().await {
        running.store(in_flight.len(), Ordering::SeqCst);
        if let Err(err) = joined {
            warn!(error = %err, "impression batch task failed");
        }
    }
}
