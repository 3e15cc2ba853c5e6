use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImpressionError {
    #[error("Counter store error: {0}")]
    CounterStore(String),

    #[error("Durable store error: {0}")]
    DurableStore(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Row '{1}' not found in table '{0}'")]
    RowNotFound(String, String),

    #[error("Unknown entity kind: '{0}'")]
    UnknownEntityKind(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Impression engine is shutting down")]
    ShuttingDown,

    #[error("Task join error: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, ImpressionError>;

impl From<tokio::task::JoinError> for ImpressionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for ImpressionError {
    fn from(err: redis::RedisError) -> Self {
        Self::CounterStore(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ImpressionError {
    fn from(err: sqlx::Error) -> Self {
        Self::DurableStore(err.to_string())
    }
}
