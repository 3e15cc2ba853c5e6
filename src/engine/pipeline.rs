use super::flusher::{BoundedFlusher, FlushReport};
use super::recorder::ImpressionRecorder;
use super::worker::RecordBatch;
use crate::core::EntityKind;
use tracing::{debug, warn};

/// What happened to one batch of views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// The recorder pass stopped early on a counter read failure
    pub aborted: bool,
    pub flush: FlushReport,
}

/// Recorder pass followed by the flush of whatever crossed the threshold
pub(crate) struct ImpressionPipeline {
    pub(crate) recorder: ImpressionRecorder,
    pub(crate) flusher: BoundedFlusher,
}

impl ImpressionPipeline {
    pub(crate) async fn process(&self, batch: RecordBatch) -> BatchReport {
        self.run(batch.kind, &batch.ids).await
    }

    pub(crate) async fn run(&self, kind: EntityKind, ids: &[String]) -> BatchReport {
        match self.recorder.collect_flushes(kind, ids).await {
            Ok(flush_ids) => {
                let flush = self.flusher.flush(kind, flush_ids).await;
                debug!(kind = %kind, views = ids.len(), flushed = flush.completed, "impression batch recorded");
                BatchReport {
                    aborted: false,
                    flush,
                }
            }
            Err(err) => {
                warn!(kind = %kind, views = ids.len(), error = %err, "impression pass aborted");
                BatchReport {
                    aborted: true,
                    flush: FlushReport::default(),
                }
            }
        }
    }
}
