//! JWT claim set shared by the issuer and the validator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of bearer token, carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    /// Missing or unrecognised `type` claim.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
            TokenKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(format!("unknown token kind: {other}")),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (user public id)
    #[serde(rename = "type", default)]
    pub kind: TokenKind,
    pub iat: i64,           // Issued at
    pub exp: i64,           // Expiration time
    #[serde(default)]
    pub jti: Option<String>,
}
