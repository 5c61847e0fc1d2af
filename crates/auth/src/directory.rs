use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// The account a connection acts as, resolved once at admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Error)]
#[error("account lookup failed: {0}")]
pub struct DirectoryError(pub String);

/// Resolves token subjects to accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_account(&self, subject: &str) -> Result<Option<Identity>, DirectoryError>;
}
