//! User repository for database operations.

use async_trait::async_trait;
use chrono::Utc;
use huddle_auth::{AccountDirectory, DirectoryError, Identity};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

use crate::entities::{format_timestamp, User};
use crate::types::{StoreError, StoreResult};

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with a freshly generated public id
    pub async fn create(&self, username: &str, email: Option<&str>) -> StoreResult<User> {
        let public_id = cuid2::create_id();
        let now = format_timestamp(&Utc::now());

        let result = sqlx::query(
            "INSERT INTO users (public_id, username, email, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(username)
        .bind(email)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, &format!("user {username}")))?;

        info!(public_id = %public_id, username, "created user");

        Ok(User {
            id: result.last_insert_rowid(),
            public_id,
            username: username.to_string(),
            email: email.map(str::to_string),
            created_at: now,
        })
    }

    /// Find user by public ID
    pub async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, public_id, username, email, created_at FROM users WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| map_user(&row)).transpose()
    }
}

fn map_user(row: &SqliteRow) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AccountDirectory for UserRepository {
    async fn find_account(&self, subject: &str) -> Result<Option<Identity>, DirectoryError> {
        self.find_by_public_id(subject)
            .await
            .map(|user| user.map(|user| user.identity()))
            .map_err(|e| DirectoryError(e.to_string()))
    }
}
