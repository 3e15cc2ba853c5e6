use super::DurableStore;
use crate::core::{ImpressionError, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// PostgreSQL durable store
///
/// Every flush is a single `UPDATE .. SET col = col + $1`, so concurrent
/// flushes of the same row never lose each other's increments.
#[derive(Clone)]
pub struct PgDurableStore {
    pool: PgPool,
}

impl PgDurableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        info!(max_connections, "connected durable store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Identifiers are interpolated into SQL, so only plain snake_case names pass.
fn checked_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(ImpressionError::DurableStore(format!("invalid identifier '{}'", name)))
    }
}

#[async_trait]
impl DurableStore for PgDurableStore {
    async fn add_to_column(&self, table: &str, id: &str, column: &str, amount: i64) -> Result<()> {
        let table = checked_identifier(table)?;
        let column = checked_identifier(column)?;
        let id = Uuid::parse_str(id)
            .map_err(|_| ImpressionError::RowNotFound(table.to_string(), id.to_string()))?;

        let sql = format!(
            "UPDATE {table} SET {column} = {column} + $1 WHERE id = $2",
            table = table,
            column = column
        );

        let result = sqlx::query(&sql)
            .bind(amount)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ImpressionError::RowNotFound(table.to_string(), id.to_string()));
        }
        Ok(())
    }
}
