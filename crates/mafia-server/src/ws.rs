//! `WebSocket` handler for live game viewers.
//!
//! Clients connect to `GET /ws/game/{id}`. They first receive an `init`
//! message carrying the public snapshot, then every event the game's
//! session broadcasts. Viewers see the public alive flags only.
//!
//! If a client falls behind, lagged messages are skipped and the client
//! resumes from the most recent event.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use mafia_core::events;
use mafia_types::{AliveView, GameEventMessage, GameId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Upgrade to a `WebSocket` streaming one game's events.
///
/// The receiver is registered before the snapshot is read so no event
/// published in between is lost. An unknown game is rejected before the
/// upgrade.
///
/// # Route
///
/// `GET /ws/game/{id}`
pub async fn ws_game(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let game_id = GameId::new(id);
    let rx = state.hub().subscribe(game_id);
    let snapshot = state
        .games
        .snapshot(game_id, None, AliveView::Public)
        .await?;
    let init = GameEventMessage::new(events::INIT, snapshot);
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, game_id, init, rx)))
}

async fn send_json(socket: &mut WebSocket, message: &GameEventMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize game event: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Forward broadcasts to the socket until either side closes.
async fn handle_ws(
    mut socket: WebSocket,
    game_id: GameId,
    init: GameEventMessage,
    mut rx: broadcast::Receiver<GameEventMessage>,
) {
    info!(%game_id, "Viewer connected");
    if !send_json(&mut socket, &init).await {
        debug!(%game_id, "Viewer disconnected before init");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        if !send_json(&mut socket, &message).await {
                            debug!(%game_id, "Viewer disconnected (send failed)");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(%game_id, skipped = n, "Viewer lagged, skipping ahead");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(%game_id, "Game channel closed");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%game_id, "Viewer disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(%game_id, "WebSocket error: {e}");
                        return;
                    }
                    // Viewers are read-only.
                    _ => {}
                }
            }
        }
    }
}
