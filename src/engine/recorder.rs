use super::stats::StatsCounters;
use crate::core::{EntityKind, IMPRESSION_THRESHOLD, Result};
use crate::counter::FastCounterStore;
use std::sync::Arc;
use tracing::warn;

/// Decides, per entity, whether a view is absorbed by the fast counter or
/// crosses the threshold and becomes a flush unit.
///
/// Counters are read and written without any per-key locking. Two passes
/// over the same key can interleave, so a reset may be overwritten by a late
/// increment; that undercount is accepted in exchange for a lock-free hot
/// path.
pub struct ImpressionRecorder {
    counters: Arc<dyn FastCounterStore>,
    stats: Arc<StatsCounters>,
}

impl ImpressionRecorder {
    pub(crate) fn new(counters: Arc<dyn FastCounterStore>, stats: Arc<StatsCounters>) -> Self {
        Self { counters, stats }
    }

    /// Run one recorder pass over a homogeneous batch.
    ///
    /// Returns the ids whose counter crossed the threshold; their counters
    /// have already been reset. A failed read abandons the whole pass and
    /// nothing from it is flushed, so counters reset earlier in the pass
    /// lose their cycle.
    pub async fn collect_flushes(&self, kind: EntityKind, ids: &[String]) -> Result<Vec<String>> {
        let mut flush_ids = Vec::new();
        let mut counted = 0u64;

        for id in ids {
            let key = kind.counter_key(id);
            let current = match self.counters.get(&key).await {
                Ok(value) => value,
                Err(err) => {
                    StatsCounters::add(&self.stats.views_counted, counted);
                    StatsCounters::add(&self.stats.passes_aborted, 1);
                    return Err(err);
                }
            };

            if current >= IMPRESSION_THRESHOLD {
                if let Err(err) = self.counters.reset(&key).await {
                    warn!(kind = %kind, entity_id = %id, error = %err, "failed to reset impression counter");
                }
                flush_ids.push(id.clone());
            } else {
                match self.counters.increment(&key).await {
                    Ok(()) => counted += 1,
                    Err(err) => {
                        warn!(kind = %kind, entity_id = %id, error = %err, "failed to increment impression counter")
                    }
                }
            }
        }

        StatsCounters::add(&self.stats.views_counted, counted);
        Ok(flush_ids)
    }
}
