//! REST API endpoint handlers.
//!
//! Every game route requires a [`Caller`] and only the game's host may
//! read or drive it. Mutating handlers lock the game's session for the
//! whole operation, release it through the service (which drops finished
//! games from the registry) and return the host's (authoritative)
//! snapshot.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness check |
//! | `GET` | `/api/games` | List the caller's games (`?status=`) |
//! | `POST` | `/api/games` | Create a game |
//! | `GET` | `/api/games/{id}` | Current game snapshot |
//! | `POST` | `/api/games/{id}/assign_roles` | Assign roles |
//! | `POST` | `/api/games/{id}/start` | Start the game |
//! | `POST` | `/api/games/{id}/action` | Record one action |
//! | `POST` | `/api/games/{id}/night_actions` | Resolve a night batch |
//! | `POST` | `/api/games/{id}/phase` | Switch phase |
//! | `POST` | `/api/games/{id}/finish` | Finish manually |
//! | `POST` | `/api/games/{id}/sync_night` | Reveal night deaths |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use mafia_types::{
    ActionRequest, AliveView, AssignRolesRequest, CreateGameRequest, FinishGameRequest, GameId,
    GameStatus, NightActionsRequest, PhaseChangeRequest,
};
use validator::Validate;

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// Query parameters for `GET /api/games`.
#[derive(Debug, serde::Deserialize)]
pub struct ListGamesQuery {
    /// Only games in this status (`pending`, `active`, `finished`).
    pub status: Option<String>,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /api/games`
pub async fn list_games(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListGamesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<GameStatus>)
        .transpose()
        .map_err(|e| ApiError::InvalidQuery(e.to_string()))?;

    let games = state.games.list_games(caller.id(), status).await?;
    Ok(Json(games))
}

/// `POST /api/games`
pub async fn create_game(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<CreateGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.games.create_game(caller.id(), &body).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// `GET /api/games/{id}`
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state
        .games
        .snapshot(GameId::new(id), Some(caller.id()), AliveView::Authoritative)
        .await?;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/assign_roles`
pub async fn assign_roles(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<AssignRolesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.assign_roles(&body).await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/start`
pub async fn start_game(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.start_game().await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/action`
pub async fn game_action(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<ActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.handle_action(&body).await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/night_actions`
pub async fn night_actions(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<NightActionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.apply_night_actions(&body).await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/phase`
pub async fn change_phase(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<PhaseChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.change_phase(body.phase).await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/finish`
pub async fn finish_game(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(body): Json<FinishGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let team = body.winning_team.trim();
    if team.is_empty() {
        return Err(ApiError::Validation("winning_team must not be empty".to_owned()));
    }
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.finish_game(team).await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}

/// `POST /api/games/{id}/sync_night`
pub async fn sync_night(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.games.session(GameId::new(id), Some(caller.id())).await?;
    let snapshot = session.sync_night_events().await?;
    state.games.release(session).await;
    Ok(Json(snapshot))
}
