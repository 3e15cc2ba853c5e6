//! Durable store
//!
//! The authoritative store owning one integer impressions column per entity
//! row. The engine only ever needs an atomic `column = column + amount`.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryDurableStore;
#[cfg(feature = "postgres")]
pub use postgres::PgDurableStore;

use crate::core::Result;
use async_trait::async_trait;

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Atomically add `amount` to `column` of the row `id` in `table`.
    async fn add_to_column(&self, table: &str, id: &str, column: &str, amount: i64) -> Result<()>;
}
