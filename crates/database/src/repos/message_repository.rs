//! Repository for message data access operations.

use async_trait::async_trait;
use chrono::Utc;
use huddle_auth::Identity;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::entities::{format_timestamp, parse_timestamp, ChatMessage};
use crate::store::MessageStore;
use crate::types::StoreResult;

/// Repository for message database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored messages in a room
    pub async fn count(&self, room_id: &str) -> StoreResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn append(&self, room_id: &str, sender: &Identity, body: &str) -> StoreResult<ChatMessage> {
        let public_id = cuid2::create_id();
        let now = format_timestamp(&Utc::now());

        // A single statement keeps the clamp and the insert atomic: the stored
        // timestamp never goes below the newest one already in the room.
        let row = sqlx::query(
            r#"
            INSERT INTO messages (public_id, room_id, user_id, body, created_at)
            VALUES (?, ?, ?, ?, MAX(?, COALESCE((SELECT MAX(created_at) FROM messages WHERE room_id = ?), '')))
            RETURNING id, created_at
            "#,
        )
        .bind(&public_id)
        .bind(room_id)
        .bind(&sender.user_id)
        .bind(body)
        .bind(&now)
        .bind(room_id)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        let created_at: String = row.try_get("created_at")?;

        debug!(
            message_id = id,
            public_id = %public_id,
            room_id,
            user_id = %sender.user_id,
            "stored chat message"
        );

        Ok(ChatMessage {
            id,
            public_id,
            room_id: room_id.to_string(),
            sender_id: sender.user_id.clone(),
            sender_username: sender.username.clone(),
            body: body.to_string(),
            created_at: parse_timestamp(&created_at)?,
        })
    }

    async fn history(&self, room_id: &str) -> StoreResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.public_id, m.room_id, m.user_id, u.username, m.body, m.created_at
            FROM messages m
            JOIN users u ON u.public_id = m.user_id
            WHERE m.room_id = ?
            ORDER BY m.created_at ASC, m.id ASC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<ChatMessage> {
                let created_at: String = row.try_get("created_at")?;
                Ok(ChatMessage {
                    id: row.try_get("id")?,
                    public_id: row.try_get("public_id")?,
                    room_id: row.try_get("room_id")?,
                    sender_id: row.try_get("user_id")?,
                    sender_username: row.try_get("username")?,
                    body: row.try_get("body")?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}
