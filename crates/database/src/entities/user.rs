//! User entity definitions

use huddle_auth::Identity;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub username: String,
    pub email: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.public_id.clone(),
            username: self.username.clone(),
        }
    }
}
