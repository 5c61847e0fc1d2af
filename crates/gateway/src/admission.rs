//! Connection admission: who is connecting, and to which room.
//!
//! Everything here runs in the upgrade handler, before a session exists.

use axum::http::{header, HeaderMap};
use axum_extra::extract::CookieJar;
use huddle_auth::{CredentialError, CredentialValidator, Identity};
use huddle_database::RoomDirectory;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::CloseReason;

/// Cookie carrying the access token.
pub const TOKEN_COOKIE: &str = "access_token";

const MAX_ROOM_ID_LEN: usize = 255;

/// Where a token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Query,
    Cookie,
    Header,
}

/// An admitted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub identity: Identity,
    pub room_id: String,
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("no credential supplied")]
    MissingCredential,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("malformed room id")]
    MalformedRoom,
    #[error("room {0} does not exist")]
    UnknownRoom(String),
    #[error("room lookup failed: {0}")]
    RoomLookup(String),
}

impl AdmissionError {
    pub fn close_reason(&self) -> CloseReason {
        match self {
            AdmissionError::MissingCredential => CloseReason::MissingCredential,
            AdmissionError::Credential(error) => CloseReason::from(error),
            AdmissionError::MalformedRoom
            | AdmissionError::UnknownRoom(_)
            | AdmissionError::RoomLookup(_) => CloseReason::InvalidRoom,
        }
    }
}

/// Pick the bearer token: query parameter, then cookie, then `Authorization`.
/// Empty values count as absent.
pub fn extract_token(
    query_token: Option<&str>,
    cookies: &CookieJar,
    headers: &HeaderMap,
) -> Option<(String, TokenSource)> {
    let non_empty = |value: &str| {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    };

    if let Some(token) = query_token.and_then(non_empty) {
        return Some((token, TokenSource::Query));
    }

    if let Some(token) = cookies.get(TOKEN_COOKIE).and_then(|c| non_empty(c.value())) {
        return Some((token, TokenSource::Cookie));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(non_empty)
        .map(|token| (token, TokenSource::Header))
}

/// Syntactic room id check. Existence is checked separately.
pub fn is_valid_room_id(room_id: &str) -> bool {
    !room_id.is_empty()
        && room_id.chars().count() <= MAX_ROOM_ID_LEN
        && !room_id.chars().any(|c| c.is_control() || c == '/')
}

/// Run every admission check in order: credential first, then room.
pub async fn admit(
    validator: &CredentialValidator,
    rooms: &dyn RoomDirectory,
    token: Option<(String, TokenSource)>,
    room_id: &str,
) -> Result<Admission, AdmissionError> {
    let Some((token, source)) = token else {
        return Err(AdmissionError::MissingCredential);
    };

    let identity = validator.validate(&token).await?;

    if !is_valid_room_id(room_id) {
        return Err(AdmissionError::MalformedRoom);
    }

    match rooms.room_exists(room_id).await {
        Ok(true) => {}
        Ok(false) => return Err(AdmissionError::UnknownRoom(room_id.to_string())),
        Err(e) => return Err(AdmissionError::RoomLookup(e.to_string())),
    }

    info!(
        user_id = %identity.user_id,
        room_id,
        token_source = ?source,
        "connection admitted"
    );

    Ok(Admission {
        identity,
        room_id: room_id.to_string(),
    })
}

/// Log a rejection at a level matching its cause.
pub fn log_rejection(error: &AdmissionError, room_id: &str) {
    let close_code = error.close_reason().code();
    match error {
        AdmissionError::Credential(CredentialError::Directory(_)) | AdmissionError::RoomLookup(_) => {
            warn!(room_id, close_code, error = %error, "admission failed")
        }
        _ => info!(room_id, close_code, error = %error, "connection rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;
    use huddle_auth::{AccountDirectory, DirectoryError, TokenIssuer, TokenKind};
    use huddle_database::{StoreError, StoreResult};
    use std::collections::HashSet;
    use std::sync::Arc;

    struct Accounts;

    #[async_trait]
    impl AccountDirectory for Accounts {
        async fn find_account(&self, subject: &str) -> Result<Option<Identity>, DirectoryError> {
            Ok((subject == "alice").then(|| Identity {
                user_id: "alice".into(),
                username: "Alice".into(),
            }))
        }
    }

    struct Rooms {
        known: HashSet<String>,
        broken: bool,
    }

    #[async_trait]
    impl RoomDirectory for Rooms {
        async fn room_exists(&self, room_id: &str) -> StoreResult<bool> {
            if self.broken {
                return Err(StoreError::Connection("offline".into()));
            }
            Ok(self.known.contains(room_id))
        }
    }

    const SECRET: &str = "admission-test-secret";

    fn fixtures() -> (CredentialValidator, TokenIssuer, Rooms) {
        let validator = CredentialValidator::new(SECRET, Arc::new(Accounts));
        let issuer = TokenIssuer::new(
            SECRET,
            chrono::Duration::minutes(5),
            chrono::Duration::days(7),
        );
        let rooms = Rooms {
            known: HashSet::from(["general".to_string()]),
            broken: false,
        };
        (validator, issuer, rooms)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn query_beats_cookie_beats_header() {
        let jar = CookieJar::new().add(Cookie::new(TOKEN_COOKIE, "from-cookie"));
        let headers = bearer("from-header");

        assert_eq!(
            extract_token(Some("from-query"), &jar, &headers),
            Some(("from-query".into(), TokenSource::Query))
        );
        assert_eq!(
            extract_token(None, &jar, &headers),
            Some(("from-cookie".into(), TokenSource::Cookie))
        );
        assert_eq!(
            extract_token(None, &CookieJar::new(), &headers),
            Some(("from-header".into(), TokenSource::Header))
        );
    }

    #[test]
    fn empty_values_count_as_absent() {
        let jar = CookieJar::new().add(Cookie::new(TOKEN_COOKIE, ""));
        assert_eq!(extract_token(Some(""), &jar, &HeaderMap::new()), None);
        assert_eq!(
            extract_token(Some("  "), &jar, &bearer("fallback")),
            Some(("fallback".into(), TokenSource::Header))
        );
    }

    #[test]
    fn room_id_syntax() {
        assert!(is_valid_room_id("general"));
        assert!(is_valid_room_id("room-42_ünïcode"));
        assert!(!is_valid_room_id(""));
        assert!(!is_valid_room_id("a/b"));
        assert!(!is_valid_room_id("tab\there"));
        assert!(!is_valid_room_id(&"x".repeat(256)));
        assert!(is_valid_room_id(&"x".repeat(255)));
    }

    #[tokio::test]
    async fn admits_valid_access_token_for_existing_room() {
        let (validator, issuer, rooms) = fixtures();
        let token = issuer.issue("alice", TokenKind::Access).unwrap();

        let admission = admit(&validator, &rooms, Some((token, TokenSource::Query)), "general")
            .await
            .unwrap();

        assert_eq!(admission.identity.user_id, "alice");
        assert_eq!(admission.room_id, "general");
    }

    #[tokio::test]
    async fn rejection_reasons_map_to_close_codes() {
        let (validator, issuer, rooms) = fixtures();
        let access = issuer.issue("alice", TokenKind::Access).unwrap();
        let expired = issuer
            .issue_with_ttl("alice", TokenKind::Access, chrono::Duration::seconds(-10))
            .unwrap();
        let refresh = issuer.issue("alice", TokenKind::Refresh).unwrap();
        let stranger = issuer.issue("mallory", TokenKind::Access).unwrap();

        let cases = [
            (None, "general", CloseReason::MissingCredential),
            (Some(expired), "general", CloseReason::CredentialExpired),
            (Some(refresh), "general", CloseReason::InvalidCredential),
            (Some(stranger), "general", CloseReason::InvalidCredential),
            (Some("garbage".to_string()), "general", CloseReason::InvalidCredential),
            (Some(access.clone()), "missing", CloseReason::InvalidRoom),
            (Some(access), "bad/room", CloseReason::InvalidRoom),
        ];

        for (token, room, expected) in cases {
            let error = admit(
                &validator,
                &rooms,
                token.map(|t| (t, TokenSource::Query)),
                room,
            )
            .await
            .unwrap_err();
            assert_eq!(error.close_reason(), expected, "{error}");
        }
    }

    #[tokio::test]
    async fn credential_is_checked_before_room() {
        let (validator, _issuer, rooms) = fixtures();
        let error = admit(&validator, &rooms, None, "bad/room").await.unwrap_err();
        assert_eq!(error.close_reason(), CloseReason::MissingCredential);
    }

    #[tokio::test]
    async fn room_lookup_failure_rejects_as_invalid_room() {
        let (validator, issuer, mut rooms) = fixtures();
        rooms.broken = true;
        let token = issuer.issue("alice", TokenKind::Access).unwrap();

        let error = admit(&validator, &rooms, Some((token, TokenSource::Cookie)), "general")
            .await
            .unwrap_err();
        assert!(matches!(error, AdmissionError::RoomLookup(_)));
        assert_eq!(error.close_reason(), CloseReason::InvalidRoom);
    }
}
