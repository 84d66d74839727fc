//! Caller identity.
//!
//! Authentication happens in front of this server; the authenticated user
//! ID arrives in the `x-user-id` header. [`Caller`] resolves it against
//! the store so handlers only ever see a known user.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use mafia_types::{User, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the authenticated user ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user making the request.
#[derive(Debug, Clone)]
pub struct Caller(pub User);

impl Caller {
    /// The caller's user ID.
    pub const fn id(&self) -> UserId {
        self.0.id
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing caller identity".to_owned()))?;
        let id: i64 = raw
            .trim()
            .parse()
            .map_err(|_err| ApiError::Unauthorized("Malformed caller identity".to_owned()))?;

        let user = state
            .store()
            .get_user_by_id(UserId::new(id))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_owned()))?;
        Ok(Self(user))
    }
}
