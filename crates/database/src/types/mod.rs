//! Shared types for the database layer

pub mod errors;

pub use errors::StoreError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
