use crate::core::{DEFAULT_WORKER_BUDGET, ImpressionError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Impression engine configuration
///
/// The threshold and flush amount are fixed constants and deliberately
/// absent here; only the execution envelope is tunable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Flush units allowed inside the durable store at once, per batch
    pub worker_budget: usize,

    /// Upper bound on a single durable increment, in milliseconds
    pub durable_timeout_ms: u64,

    /// Pending batches buffered for the background worker
    pub queue_capacity: usize,

    /// How long shutdown waits for in-flight batches, in milliseconds
    pub shutdown_grace_ms: u64,

    /// Redis URL for the fast counter store, if any
    pub counter_url: Option<String>,

    /// PostgreSQL URL for the durable store, if any
    pub database_url: Option<String>,

    /// Maximum connections in the durable store pool
    pub db_max_connections: u32,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            worker_budget: DEFAULT_WORKER_BUDGET,
            durable_timeout_ms: 5_000,
            queue_capacity: 1024,
            shutdown_grace_ms: 10_000,
            counter_url: None,
            database_url: None,
            db_max_connections: 5,
        }
    }

    /// Set the worker budget
    pub fn worker_budget(mut self, budget: usize) -> Self {
        self.worker_budget = budget;
        self
    }

    /// Set the durable increment timeout
    pub fn durable_timeout(mut self, timeout: Duration) -> Self {
        self.durable_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the background queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Set the Redis URL
    pub fn counter_url(mut self, url: &str) -> Self {
        self.counter_url = Some(url.to_string());
        self
    }

    /// Set the PostgreSQL URL
    pub fn database_url(mut self, url: &str) -> Self {
        self.database_url = Some(url.to_string());
        self
    }

    /// Set maximum durable store connections
    pub fn db_max_connections(mut self, max: u32) -> Self {
        self.db_max_connections = max;
        self
    }

    pub fn durable_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.durable_timeout_ms)
    }

    pub fn shutdown_grace_duration(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Load from the process environment, after reading `.env` if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults per key
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new();

        let config = Self {
            worker_budget: parse_or(&lookup, "IMPRESSIONS_WORKER_BUDGET", defaults.worker_budget)?,
            durable_timeout_ms: parse_or(
                &lookup,
                "IMPRESSIONS_DURABLE_TIMEOUT_MS",
                defaults.durable_timeout_ms,
            )?,
            queue_capacity: parse_or(&lookup, "IMPRESSIONS_QUEUE_CAPACITY", defaults.queue_capacity)?,
            shutdown_grace_ms: parse_or(
                &lookup,
                "IMPRESSIONS_SHUTDOWN_GRACE_MS",
                defaults.shutdown_grace_ms,
            )?,
            counter_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_budget == 0 {
            return Err(ImpressionError::Config("worker_budget must be > 0".to_string()));
        }

        if self.queue_capacity == 0 {
            return Err(ImpressionError::Config("queue_capacity must be > 0".to_string()));
        }

        if self.durable_timeout_ms == 0 {
            return Err(ImpressionError::Config(
                "durable_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.db_max_connections == 0 {
            return Err(ImpressionError::Config(
                "db_max_connections must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ImpressionError::Config(format!("{key} is invalid: {e}"))),
        None => {
            debug!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
