use super::FastCounterStore;
use crate::core::{CounterKey, Result};
use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use std::time::Duration;
use tracing::info;

/// Redis-backed counter store
///
/// Uses plain string counters: `GET` (nil reads as 0), `INCR`, `SET key 0`.
/// The connection manager reconnects on its own; a failed call surfaces as
/// an error for that call only.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Some(Duration::from_millis(100)));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        info!(url = %redis_url, "connected fast counter store");
        Ok(Self { connection })
    }

    pub fn from_manager(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl FastCounterStore for RedisCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<u64> {
        let mut conn = self.connection.clone();
        let value: Option<u64> = conn.get(key.as_str()).await?;
        Ok(value.unwrap_or(0))
    }

    async fn increment(&self, key: &CounterKey) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: u64 = conn.incr(key.as_str(), 1u64).await?;
        Ok(())
    }

    async fn reset(&self, key: &CounterKey) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set(key.as_str(), 0u64).await?;
        Ok(())
    }
}
