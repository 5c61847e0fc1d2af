//! Token minting for operators and tests.
//!
//! Production tokens come from the login/refresh endpoints; this mirrors the
//! claim layout they emit so that the validator can be exercised end to end.

use chrono::{Duration, Utc};
use huddle_config::AuthConfig;
use jsonwebtoken::{encode, EncodingKey, Header};
use thiserror::Error;

use crate::claims::{Claims, TokenKind};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("failed to encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("token lifetime is out of range")]
    LifetimeOutOfRange,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, IssueError> {
        let access = i64::try_from(config.access_token_ttl_seconds)
            .map_err(|_| IssueError::LifetimeOutOfRange)?;
        let refresh = i64::try_from(config.refresh_token_ttl_seconds)
            .map_err(|_| IssueError::LifetimeOutOfRange)?;

        Ok(Self::new(
            &config.jwt_secret,
            Duration::try_seconds(access).ok_or(IssueError::LifetimeOutOfRange)?,
            Duration::try_seconds(refresh).ok_or(IssueError::LifetimeOutOfRange)?,
        ))
    }

    /// Mint a token of the given kind with the configured lifetime.
    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<String, IssueError> {
        let ttl = match kind {
            TokenKind::Refresh => self.refresh_ttl,
            _ => self.access_ttl,
        };
        self.issue_with_ttl(subject, kind, ttl)
    }

    /// Mint a token with an explicit lifetime. A negative lifetime yields an already expired token.
    pub fn issue_with_ttl(
        &self,
        subject: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, IssueError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(IssueError::LifetimeOutOfRange)?;

        let claims = Claims {
            sub: subject.to_string(),
            kind,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}
