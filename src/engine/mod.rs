//! Impression accumulation and batched-flush engine
//!
//! Listing endpoints hand their result rows to [`ImpressionEngine`] and move
//! on. A background worker runs the recorder pass against the fast counter
//! store and flushes entities that crossed the threshold to the durable
//! store. Nothing here can fail or slow down the caller's response.

pub mod flusher;
pub mod pipeline;
pub mod recorder;
pub mod stats;
mod worker;

pub use flusher::{BoundedFlusher, FlushReport};
pub use pipeline::BatchReport;
pub use recorder::ImpressionRecorder;
pub use stats::ImpressionStats;

use crate::config::EngineConfig;
use crate::core::{EntityKind, ImpressionError, Result};
use crate::counter::{FastCounterStore, MemoryCounterStore};
use crate::durable::{DurableStore, MemoryDurableStore};
use crate::entity::{DurablyIncrementable, Identifiable};
use pipeline::ImpressionPipeline;
use stats::StatsCounters;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use worker::{ImpressionWorker, RecordBatch, spawn_impression_worker};

pub struct ImpressionEngine {
    config: EngineConfig,
    pipeline: Arc<ImpressionPipeline>,
    stats: Arc<StatsCounters>,
    queue: mpsc::Sender<RecordBatch>,
    accepting: AtomicBool,
    worker: Mutex<Option<ImpressionWorker>>,
}

impl ImpressionEngine {
    /// Wire an engine over explicit backends.
    ///
    /// Must be called inside a tokio runtime: the background worker is
    /// spawned here.
    pub fn new(
        counters: Arc<dyn FastCounterStore>,
        durable: Arc<dyn DurableStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(StatsCounters::default());
        let pipeline = Arc::new(ImpressionPipeline {
            recorder: ImpressionRecorder::new(counters, Arc::clone(&stats)),
            flusher: BoundedFlusher::new(
                durable,
                config.worker_budget,
                config.durable_timeout_duration(),
                Arc::clone(&stats),
            ),
        });

        let (queue, worker) = spawn_impression_worker(
            Arc::clone(&pipeline),
            config.queue_capacity,
            Arc::clone(&stats),
        );

        Ok(Self {
            config,
            pipeline,
            stats,
            queue,
            accepting: AtomicBool::new(true),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Engine over in-memory backends, one durable table per entity kind
    pub async fn in_memory(config: EngineConfig) -> Result<Self> {
        let counters = Arc::new(MemoryCounterStore::new());
        let durable = Arc::new(MemoryDurableStore::with_entity_tables().await);
        Self::new(counters, durable, config)
    }

    /// Build backends from the configured URLs.
    ///
    /// A URL whose backend was not compiled in is a wiring error, reported
    /// here rather than on the first recorded view.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let counters = connect_counters(&config).await?;
        let durable = connect_durable(&config).await?;
        Self::new(counters, durable, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record one view for each entity in a listing response.
    ///
    /// Returns immediately; counting and flushing happen on the background
    /// worker. If the queue is full or the engine is shutting down the batch
    /// is dropped and logged.
    pub fn record_impressions<T>(&self, entities: &[T])
    where
        T: Identifiable + DurablyIncrementable,
    {
        self.record_with(T::KIND, entities, |entity| entity.impression_id());
    }

    /// Record views with an explicit kind and id extractor
    pub fn record_with<T, F>(&self, kind: EntityKind, entities: &[T], id_of: F)
    where
        F: Fn(&T) -> String,
    {
        if entities.is_empty() {
            return;
        }

        let batch = RecordBatch {
            kind,
            ids: entities.iter().map(id_of).collect(),
        };
        self.enqueue(batch);
    }

    /// Run the recorder pass and flush inline.
    ///
    /// For callers already off the request path, such as scheduled jobs,
    /// that want the outcome.
    pub async fn record_now<T>(&self, entities: &[T]) -> BatchReport
    where
        T: Identifiable + DurablyIncrementable,
    {
        let ids: Vec<String> = entities.iter().map(|e| e.impression_id()).collect();
        if ids.is_empty() {
            return BatchReport::default();
        }
        self.pipeline.run(T::KIND, &ids).await
    }

    pub fn stats(&self) -> ImpressionStats {
        self.stats.snapshot()
    }

    /// Stop accepting views and wait for queued and in-flight batches.
    ///
    /// Calling it more than once is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        self.accepting.store(false, Ordering::SeqCst);

        let worker = self.worker.lock().await.take();
        match worker {
            Some(worker) => worker.stop(self.config.shutdown_grace_duration()).await,
            None => Ok(()),
        }
    }

    fn enqueue(&self, batch: RecordBatch) {
        let kind = batch.kind;
        let views = batch.ids.len();

        if !self.accepting.load(Ordering::SeqCst) {
            StatsCounters::add(&self.stats.batches_dropped, 1);
            warn!(kind = %kind, views, error = %ImpressionError::ShuttingDown, "impression batch dropped");
            return;
        }

        match self.queue.try_send(batch) {
            Ok(()) => StatsCounters::add(&self.stats.batches_received, 1),
            Err(TrySendError::Full(_)) => {
                StatsCounters::add(&self.stats.batches_dropped, 1);
                warn!(kind = %kind, views, "impression queue full, batch dropped");
            }
            Err(TrySendError::Closed(_)) => {
                StatsCounters::add(&self.stats.batches_dropped, 1);
                warn!(kind = %kind, views, error = %ImpressionError::ShuttingDown, "impression batch dropped");
            }
        }
    }
}

async fn connect_counters(config: &EngineConfig) -> Result<Arc<dyn FastCounterStore>> {
    match config.counter_url.as_deref() {
        None => {
            info!("fast counter store: memory");
            Ok(Arc::new(MemoryCounterStore::new()))
        }
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(crate::counter::RedisCounterStore::connect(url).await?)),
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(ImpressionError::Config(
            "counter_url is set but the `redis` feature is disabled".to_string(),
        )),
    }
}

async fn connect_durable(config: &EngineConfig) -> Result<Arc<dyn DurableStore>> {
    match config.database_url.as_deref() {
        None => {
            info!("durable store: memory");
            Ok(Arc::new(MemoryDurableStore::with_entity_tables().await))
        }
        #[cfg(feature = "postgres")]
        Some(url) => Ok(Arc::new(
            crate::durable::PgDurableStore::connect(
                url,
                config.db_max_connections,
                config.durable_timeout_duration(),
            )
            .await?,
        )),
        #[cfg(not(feature = "postgres"))]
        Some(_) => Err(ImpressionError::Config(
            "database_url is set but the `postgres` feature is disabled".to_string(),
        )),
    }
}
