//! Storage seams consumed by the realtime gateway.

use async_trait::async_trait;
use huddle_auth::Identity;

use crate::entities::ChatMessage;
use crate::types::StoreResult;

/// Durable, per-room ordered log of chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its server-assigned timestamp.
    async fn append(&self, room_id: &str, sender: &Identity, body: &str) -> StoreResult<ChatMessage>;

    /// All messages of a room, oldest first.
    async fn history(&self, room_id: &str) -> StoreResult<Vec<ChatMessage>>;
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn room_exists(&self, room_id: &str) -> StoreResult<bool>;
}
