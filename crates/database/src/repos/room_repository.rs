//! Room repository. Rooms are managed by the REST layer; the realtime side only checks existence.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::entities::{format_timestamp, Room};
use crate::store::RoomDirectory;
use crate::types::{StoreError, StoreResult};

#[derive(Clone)]
pub struct RoomRepository {
    pool: SqlitePool,
}

impl RoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a room. Without an explicit id a random UUID is assigned.
    pub async fn create(&self, name: &str, room_id: Option<&str>) -> StoreResult<Room> {
        let room_id = room_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = format_timestamp(&Utc::now());

        sqlx::query("INSERT INTO rooms (room_id, name, created_at) VALUES (?, ?, ?)")
            .bind(&room_id)
            .bind(name)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, &format!("room {room_id}")))?;

        info!(room_id = %room_id, name, "created room");

        Ok(Room {
            room_id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub async fn find(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let row = sqlx::query("SELECT room_id, name, created_at FROM rooms WHERE room_id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> StoreResult<Room> {
            Ok(Room {
                room_id: row.try_get("room_id")?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl RoomDirectory for RoomRepository {
    async fn room_exists(&self, room_id: &str) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM rooms WHERE room_id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}
