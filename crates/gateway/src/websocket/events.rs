//! Wire format of the chat websocket.

use huddle_auth::Identity;
use huddle_database::entities::format_timestamp;
use huddle_database::ChatMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body value that means "I am typing" rather than chat content.
pub const TYPING_SIGNAL: &str = "typing";

/// Events sent to websocket clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Room backlog, oldest first. Always the first frame of a session.
    MessageHistory { messages: Vec<HistoryEntry> },
    /// A newly persisted chat message
    Message {
        message: String,
        user: String,
        username: String,
        timestamp: String,
    },
    /// Someone in the room is typing
    Typing { user: String, username: String },
    /// Something the client sent was rejected
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user: String,
    pub username: String,
    pub message: String,
    pub timestamp: String,
}

impl From<&ChatMessage> for HistoryEntry {
    fn from(message: &ChatMessage) -> Self {
        Self {
            user: message.sender_id.clone(),
            username: message.sender_username.clone(),
            message: message.body.clone(),
            timestamp: format_timestamp(&message.created_at),
        }
    }
}

impl ServerEvent {
    pub fn history(messages: &[ChatMessage]) -> Self {
        ServerEvent::MessageHistory {
            messages: messages.iter().map(HistoryEntry::from).collect(),
        }
    }

    pub fn message(message: &ChatMessage) -> Self {
        ServerEvent::Message {
            message: message.body.clone(),
            user: message.sender_id.clone(),
            username: message.sender_username.clone(),
            timestamp: format_timestamp(&message.created_at),
        }
    }

    pub fn typing(identity: &Identity) -> Self {
        ServerEvent::Typing {
            user: identity.user_id.clone(),
            username: identity.username.clone(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientPayload {
    message: String,
}

/// What a client can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Typing,
    Chat(String),
}

/// Reasons an inbound frame is refused. The display text goes back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboundError {
    #[error("Invalid message format")]
    Malformed,
    #[error("Message cannot be empty")]
    Empty,
    #[error("Message exceeds {0} characters")]
    TooLong(usize),
    #[error("Binary frames are not supported")]
    Binary,
}

/// Decode a text frame of the form `{"message": "..."}`.
pub fn parse_client_event(text: &str, max_length: usize) -> Result<ClientEvent, InboundError> {
    let payload: ClientPayload =
        serde_json::from_str(text).map_err(|_| InboundError::Malformed)?;

    if payload.message == TYPING_SIGNAL {
        return Ok(ClientEvent::Typing);
    }
    if payload.message.trim().is_empty() {
        return Err(InboundError::Empty);
    }
    if payload.message.chars().count() > max_length {
        return Err(InboundError::TooLong(max_length));
    }

    Ok(ClientEvent::Chat(payload.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn stored(body: &str) -> ChatMessage {
        ChatMessage {
            id: 7,
            public_id: "m7".into(),
            room_id: "general".into(),
            sender_id: "u1".into(),
            sender_username: "alice".into(),
            body: body.into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn outbound_events_carry_type_discriminator() {
        let message = serde_json::to_value(ServerEvent::message(&stored("hi"))).unwrap();
        assert_eq!(
            message,
            json!({
                "type": "message",
                "message": "hi",
                "user": "u1",
                "username": "alice",
                "timestamp": "2024-05-01T12:00:00.000000Z",
            })
        );

        let history = serde_json::to_value(ServerEvent::history(&[stored("a")])).unwrap();
        assert_eq!(history["type"], "message_history");
        assert_eq!(history["messages"][0]["message"], "a");

        let typing = serde_json::to_value(ServerEvent::typing(&Identity {
            user_id: "u1".into(),
            username: "alice".into(),
        }))
        .unwrap();
        assert_eq!(typing, json!({"type": "typing", "user": "u1", "username": "alice"}));

        let error = serde_json::to_value(ServerEvent::error("nope")).unwrap();
        assert_eq!(error, json!({"type": "error", "message": "nope"}));
    }

    #[test]
    fn empty_history_is_an_empty_array() {
        let history = serde_json::to_value(ServerEvent::history(&[])).unwrap();
        assert_eq!(history, json!({"type": "message_history", "messages": []}));
    }

    #[test]
    fn parses_chat_and_typing() {
        assert_eq!(
            parse_client_event(r#"{"message":"hi"}"#, 10),
            Ok(ClientEvent::Chat("hi".into()))
        );
        assert_eq!(
            parse_client_event(r#"{"message":"typing"}"#, 10),
            Ok(ClientEvent::Typing)
        );
    }

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(parse_client_event("", 10), Err(InboundError::Malformed));
        assert_eq!(parse_client_event("not json", 10), Err(InboundError::Malformed));
        assert_eq!(parse_client_event(r#"{"text":"hi"}"#, 10), Err(InboundError::Malformed));
        assert_eq!(parse_client_event(r#"{"message":5}"#, 10), Err(InboundError::Malformed));
        assert_eq!(parse_client_event(r#"{"message":"   "}"#, 10), Err(InboundError::Empty));
        assert_eq!(
            parse_client_event(r#"{"message":"0123456789x"}"#, 10),
            Err(InboundError::TooLong(10))
        );
    }

    #[test]
    fn length_limit_counts_characters() {
        assert_eq!(
            parse_client_event(r#"{"message":"ééééé"}"#, 5),
            Ok(ClientEvent::Chat("ééééé".into()))
        );
    }
}
