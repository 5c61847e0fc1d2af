//! Close reasons for the chat websocket

use huddle_auth::CredentialError;

/// Why the server closed, or refused, a websocket connection.
///
/// Each variant carries a stable close code so clients can branch on it:
/// an expired credential means "refresh and reconnect", the others abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    MissingCredential,
    CredentialExpired,
    InvalidCredential,
    InvalidRoom,
    SlowConsumer,
    GoingAway,
}

impl CloseReason {
    pub const fn code(self) -> u16 {
        match self {
            CloseReason::MissingCredential => 4000,
            CloseReason::CredentialExpired => 4001,
            CloseReason::InvalidCredential => 4002,
            CloseReason::InvalidRoom => 4003,
            CloseReason::SlowConsumer => 4008,
            CloseReason::GoingAway => 1001,
        }
    }

    /// Short text sent along with the close code.
    pub const fn description(self) -> &'static str {
        match self {
            CloseReason::MissingCredential => "missing credential",
            CloseReason::CredentialExpired => "credential expired",
            CloseReason::InvalidCredential => "invalid credential",
            CloseReason::InvalidRoom => "invalid room",
            CloseReason::SlowConsumer => "outbound queue overflow",
            CloseReason::GoingAway => "server shutting down",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

impl From<&CredentialError> for CloseReason {
    fn from(error: &CredentialError) -> Self {
        match error {
            CredentialError::Expired => CloseReason::CredentialExpired,
            CredentialError::Malformed(_)
            | CredentialError::WrongKind(_)
            | CredentialError::UnknownSubject
            | CredentialError::Directory(_) => CloseReason::InvalidCredential,
        }
    }
}
