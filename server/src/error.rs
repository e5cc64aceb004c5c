//! Error taxonomy for message handling.
//!
//! Only [`ServerError::Internal`] ends a connection; everything else is reported to
//! the requesting client and the connection keeps serving.

use shared::protocol::ErrorMessage;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Game,
    Lobby,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Player => f.write_str("player"),
            EntityKind::Game => f.write_str("game"),
            EntityKind::Lobby => f.write_str("lobby"),
        }
    }
}

/// Why the ball authority refused a client's ball update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BallDenial {
    #[error("a live game ball already exists")]
    AlreadyLive,

    #[error("ball id doesn't match the live ball")]
    StaleBall,

    #[error("touch count incorrect: {client} (client) vs {server} (server)")]
    TouchCountMismatch { client: i32, server: i32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("ball update denied: {0}")]
    Denied(#[from] BallDenial),

    #[error("no free room code after {attempts} attempts")]
    Capacity { attempts: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// Whether the connection that produced this error must be torn down.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ServerError::NotFound { .. } => "NotFound",
            ServerError::Malformed(_) => "Malformed",
            ServerError::Denied(_) => "Denied",
            ServerError::Capacity { .. } => "Capacity",
            ServerError::Internal(_) => "Internal",
        }
    }

    /// Payload sent back to the requester.
    pub fn to_message(&self) -> ErrorMessage {
        ErrorMessage {
            kind: self.kind_name().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Malformed(err.to_string())
    }
}

impl From<shared::TagError> for ServerError {
    fn from(err: shared::TagError) -> Self {
        ServerError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_internal_is_fatal() {
        assert!(ServerError::internal("boom").is_fatal_to_connection());
        assert!(!ServerError::not_found(EntityKind::Game, "g").is_fatal_to_connection());
        assert!(!ServerError::malformed("bad").is_fatal_to_connection());
        assert!(!ServerError::Denied(BallDenial::StaleBall).is_fatal_to_connection());
        assert!(!ServerError::Capacity { attempts: 3 }.is_fatal_to_connection());
    }

    #[test]
    fn test_error_message_carries_kind_and_reason() {
        let err: ServerError = BallDenial::TouchCountMismatch {
            client: 2,
            server: 0,
        }
        .into();
        let msg = err.to_message();
        assert_eq!(msg.kind, "Denied");
        assert!(msg.message.contains("2 (client) vs 0 (server)"));

        let msg = ServerError::not_found(EntityKind::Lobby, "QBPX").to_message();
        assert_eq!(msg.kind, "NotFound");
        assert_eq!(msg.message, "lobby not found: QBPX");
    }

    #[test]
    fn test_json_errors_become_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(ServerError::from(err), ServerError::Malformed(_)));
    }
}
