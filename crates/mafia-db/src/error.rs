//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors with additional context about which
//! operation failed. Absence of an entity is never an error: lookups
//! return `Ok(None)` instead.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A parent entity required by a write does not exist.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A uniqueness constraint was violated (e.g. a taken username).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<mafia_types::ParseEnumError> for DbError {
    fn from(err: mafia_types::ParseEnumError) -> Self {
        Self::Corrupt(err.to_string())
    }
}
