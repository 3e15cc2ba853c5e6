use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals shared by the recorder, flusher and worker
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) batches_received: AtomicU64,
    pub(crate) batches_dropped: AtomicU64,
    pub(crate) passes_aborted: AtomicU64,
    pub(crate) views_counted: AtomicU64,
    pub(crate) flushes_dispatched: AtomicU64,
    pub(crate) flushes_completed: AtomicU64,
    pub(crate) flushes_failed: AtomicU64,
    pub(crate) batches_aborted: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ImpressionStats {
        ImpressionStats {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            passes_aborted: self.passes_aborted.load(Ordering::Relaxed),
            views_counted: self.views_counted.load(Ordering::Relaxed),
            flushes_dispatched: self.flushes_dispatched.load(Ordering::Relaxed),
            flushes_completed: self.flushes_completed.load(Ordering::Relaxed),
            flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
            batches_aborted: self.batches_aborted.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImpressionStats {
    /// Batches accepted into the background queue
    pub batches_received: u64,
    /// Batches discarded because the queue was full or closed
    pub batches_dropped: u64,
    /// Recorder passes abandoned after a counter read failed
    pub passes_aborted: u64,
    /// Views absorbed by a counter increment
    pub views_counted: u64,
    /// Flush units scheduled against the durable store
    pub flushes_dispatched: u64,
    /// Flush units whose durable increment succeeded
    pub flushes_completed: u64,
    /// Flush units that failed or timed out
    pub flushes_failed: u64,
    /// Batches still running when the shutdown grace period ran out
    pub batches_aborted: u64,
}
