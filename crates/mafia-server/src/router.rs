//! Axum router construction for the MafiaDesk API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS enabled for the browser host console.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router.
///
/// See [`handlers`] for the REST endpoint table; `GET /ws/game/{id}`
/// streams a game's live events.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws/game/{id}", get(ws::ws_game))
        // REST API
        .route(
            "/api/games",
            get(handlers::list_games).post(handlers::create_game),
        )
        .route("/api/games/{id}", get(handlers::get_game))
        .route("/api/games/{id}/assign_roles", post(handlers::assign_roles))
        .route("/api/games/{id}/start", post(handlers::start_game))
        .route("/api/games/{id}/action", post(handlers::game_action))
        .route("/api/games/{id}/night_actions", post(handlers::night_actions))
        .route("/api/games/{id}/phase", post(handlers::change_phase))
        .route("/api/games/{id}/finish", post(handlers::finish_game))
        .route("/api/games/{id}/sync_night", post(handlers::sync_night))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
