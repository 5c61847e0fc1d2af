//! Huddle Database Crate
//!
//! This crate provides database functionality for the Huddle backend,
//! including connection management, migrations, and the repositories that
//! back the message store, the room directory and the account directory.

use huddle_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod store;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use entities::{ChatMessage, Room, User};
pub use repos::{MessageRepository, RoomRepository, UserRepository};
pub use store::{MessageStore, RoomDirectory};
pub use types::{errors::StoreError, StoreResult};

/// Initialize the database with migrations
pub async fn initialize_database(config: &DatabaseConfig) -> StoreResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| StoreError::Connection(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| StoreError::Migration(format!("{e:#}")))?;

    Ok(pool)
}
