//! Error types for the database layer

use thiserror::Error;

/// Errors raised by the repositories
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Database query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Map unique constraint violations to `Duplicate`, everything else to `Query`.
    pub(crate) fn from_insert(error: sqlx::Error, entity: &str) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(entity.to_string())
            }
            _ => StoreError::Query(error),
        }
    }
}
