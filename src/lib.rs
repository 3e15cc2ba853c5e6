// ============================================================================
// Impressions Library
// ============================================================================

pub mod core;
pub mod config;
pub mod counter;
pub mod durable;
pub mod engine;
pub mod entity;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use crate::core::{
    CounterKey, EntityKind, ImpressionError, Result, FLUSH_AMOUNT, IMPRESSION_THRESHOLD,
    IMPRESSIONS_COLUMN,
};
pub use counter::{FastCounterStore, MemoryCounterStore};
pub use durable::{DurableStore, MemoryDurableStore};
pub use engine::{BatchReport, FlushReport, ImpressionEngine, ImpressionStats};
pub use entity::{DurablyIncrementable, Event, Identifiable, Opening, Post, Project, User};

#[cfg(feature = "redis")]
pub use counter::RedisCounterStore;
#[cfg(feature = "postgres")]
pub use durable::PgDurableStore;
