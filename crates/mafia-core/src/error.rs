//! Error types for game session operations.
//!
//! Every operation either succeeds with a snapshot or fails with a
//! [`GameError`] without broadcasting anything. [`GameError::kind`] gives
//! the transport layer a stable classification to map onto status codes.

use mafia_db::DbError;
use mafia_types::ActionParseError;

/// Classification of a [`GameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The game or player does not exist.
    NotFound,
    /// The caller is not the game's host.
    Forbidden,
    /// A uniqueness rule was violated.
    Conflict,
    /// The request is invalid for the current game state.
    BadRequest,
    /// Storage or an internal invariant failed.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name, used in API error bodies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::BadRequest => "bad_request",
            Self::Internal => "internal",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while loading or mutating a game.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The game or player does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The caller may not act on this game.
    #[error("{0}")]
    Forbidden(String),

    /// A uniqueness rule was violated.
    #[error("{0}")]
    Conflict(String),

    /// The request is invalid for the current game state.
    #[error("{0}")]
    BadRequest(String),

    /// An internal invariant failed (e.g. a game vanished mid-operation).
    #[error("{0}")]
    Internal(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Store(DbError),
}

impl GameError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// The "Game not found" error.
    pub fn game_not_found() -> Self {
        Self::NotFound("Game not found".to_owned())
    }

    /// The "Player not found" error.
    pub fn player_not_found() -> Self {
        Self::NotFound("Player not found".to_owned())
    }
}

impl From<DbError> for GameError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Store(other),
        }
    }
}

impl From<ActionParseError> for GameError {
    fn from(err: ActionParseError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
