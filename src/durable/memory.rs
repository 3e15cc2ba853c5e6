use super::DurableStore;
use crate::core::{EntityKind, IMPRESSIONS_COLUMN, ImpressionError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Row = HashMap<String, i64>;

/// In-memory durable store
///
/// Tables hold rows of integer columns, each table behind its own lock so
/// flushes for different kinds never contend.
#[derive(Default)]
pub struct MemoryDurableStore {
    tables: RwLock<HashMap<String, Arc<RwLock<HashMap<String, Row>>>>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one table per entity kind already registered
    pub async fn with_entity_tables() -> Self {
        let store = Self::new();
        for kind in EntityKind::ALL {
            store.register_table(kind.table()).await;
        }
        store
    }

    /// Register a table; registering an existing table keeps its rows
    pub async fn register_table(&self, table: &str) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default();
    }

    /// Insert a row with its impressions column at 0
    pub async fn insert_row(&self, table: &str, id: &str) -> Result<()> {
        let handle = self.get_table(table).await?;
        let mut rows = handle.write().await;
        rows.entry(id.to_string())
            .or_insert_with(|| HashMap::from([(IMPRESSIONS_COLUMN.to_string(), 0)]));
        Ok(())
    }

    /// Read a column, `None` if the row does not exist
    pub async fn read_column(&self, table: &str, id: &str, column: &str) -> Result<Option<i64>> {
        let handle = self.get_table(table).await?;
        let rows = handle.read().await;
        Ok(rows
            .get(id)
            .map(|row| row.get(column).copied().unwrap_or(0)))
    }

    async fn get_table(&self, table: &str) -> Result<Arc<RwLock<HashMap<String, Row>>>> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .cloned()
            .ok_or_else(|| ImpressionError::TableNotFound(table.to_string()))
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn add_to_column(&self, table: &str, id: &str, column: &str, amount: i64) -> Result<()> {
        let handle = self.get_table(table).await?;
        let mut rows = handle.write().await;
        let row = rows
            .get_mut(id)
            .ok_or_else(|| ImpressionError::RowNotFound(table.to_string(), id.to_string()))?;

        let value = row.entry(column.to_string()).or_insert(0);
        *value = value.saturating_add(amount);
        Ok(())
    }
}
