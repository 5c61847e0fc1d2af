//! Access token validation.

use std::sync::Arc;

use chrono::Utc;
use huddle_config::AuthConfig;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use thiserror::Error;
use tracing::debug;

use crate::claims::{Claims, TokenKind};
use crate::directory::{AccountDirectory, Identity};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token has expired")]
    Expired,
    #[error("token of kind {0} cannot open a connection")]
    WrongKind(TokenKind),
    #[error("token subject does not exist")]
    UnknownSubject,
    #[error("{0}")]
    Directory(String),
}

/// Verifies bearer tokens and resolves their subject.
///
/// Holds no per-call state, so a single instance is shared by every connection.
#[derive(Clone)]
pub struct CredentialValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    accounts: Arc<dyn AccountDirectory>,
}

impl CredentialValidator {
    pub fn new(secret: &str, accounts: Arc<dyn AccountDirectory>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand with zero leeway so it can be told apart from bad signatures.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            accounts,
        }
    }

    pub fn from_config(config: &AuthConfig, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self::new(&config.jwt_secret, accounts)
    }

    /// Validate a token and resolve the account it was issued for.
    pub async fn validate(&self, token: &str) -> Result<Identity, CredentialError> {
        let claims = self.verify(token)?;

        match self.accounts.find_account(&claims.sub).await {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => Err(CredentialError::UnknownSubject),
            Err(error) => Err(CredentialError::Directory(error.to_string())),
        }
    }

    /// Check signature, expiry and kind without touching the account directory.
    pub fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, now: i64) -> Result<Claims, CredentialError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| CredentialError::Malformed(err.to_string()))?
            .claims;

        if now >= claims.exp {
            debug!(subject = %claims.sub, exp = claims.exp, "token expired");
            return Err(CredentialError::Expired);
        }

        if claims.kind != TokenKind::Access {
            return Err(CredentialError::WrongKind(claims.kind));
        }

        Ok(claims)
    }
}
