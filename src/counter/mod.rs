//! Fast counter store
//!
//! Low-latency, loss-tolerant counters keyed by [`CounterKey`]. Impressions
//! coalesce here between durable flushes. Backends are treated as a cache:
//! losing every counter on restart only undercounts the current cycle.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryCounterStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCounterStore;

use crate::core::{CounterKey, Result};
use async_trait::async_trait;

#[async_trait]
pub trait FastCounterStore: Send + Sync {
    /// Current value; a key that was never written reads as 0.
    async fn get(&self, key: &CounterKey) -> Result<u64>;

    /// Add one to the counter, creating it if needed.
    async fn increment(&self, key: &CounterKey) -> Result<()>;

    /// Set the counter back to 0. Resetting a zero or missing key is a no-op.
    async fn reset(&self, key: &CounterKey) -> Result<()>;
}
