pub mod error;
pub mod kind;

pub use error::{ImpressionError, Result};
pub use kind::{
    CounterKey, DEFAULT_WORKER_BUDGET, EntityKind, FLUSH_AMOUNT, IMPRESSION_THRESHOLD,
    IMPRESSIONS_COLUMN,
};
