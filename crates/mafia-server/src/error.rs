//! Error types for the MafiaDesk API server.
//!
//! [`ApiError`] unifies every failure a handler can hit into a single enum
//! that converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mafia_core::{ErrorKind, GameError};
use mafia_db::DbError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A game operation failed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// No caller identity, or an unknown one.
    #[error("{0}")]
    Unauthorized(String),

    /// The request body failed validation.
    #[error("{0}")]
    Validation(String),

    /// A query parameter could not be parsed.
    #[error("{0}")]
    InvalidQuery(String),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::Game(GameError::from(err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|e| e.message.as_ref().map(ToString::to_string))
            .next()
            .unwrap_or_else(|| errors.to_string());
        Self::Validation(message)
    }
}

impl ApiError {
    /// Machine-readable error class and HTTP status.
    pub const fn classify(&self) -> (&'static str, StatusCode) {
        match self {
            Self::Game(err) => match err.kind() {
                ErrorKind::NotFound => ("not_found", StatusCode::NOT_FOUND),
                ErrorKind::Forbidden => ("forbidden", StatusCode::FORBIDDEN),
                ErrorKind::Conflict => ("conflict", StatusCode::CONFLICT),
                ErrorKind::BadRequest => ("bad_request", StatusCode::BAD_REQUEST),
                ErrorKind::Internal => ("internal", StatusCode::INTERNAL_SERVER_ERROR),
            },
            Self::Unauthorized(_) => ("unauthorized", StatusCode::UNAUTHORIZED),
            Self::Validation(_) => ("validation", StatusCode::UNPROCESSABLE_ENTITY),
            Self::InvalidQuery(_) => ("bad_request", StatusCode::BAD_REQUEST),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, status) = self.classify();
        let message = match &self {
            Self::Game(GameError::Store(err)) => {
                tracing::warn!(error = %err, "Storage failure");
                "Internal storage error".to_owned()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": kind,
            "message": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
