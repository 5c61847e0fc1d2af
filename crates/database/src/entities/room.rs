//! Room entity definitions

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub created_at: String,
}
