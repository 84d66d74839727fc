//! Shared application state for the MafiaDesk API server.
//!
//! [`AppState`] wraps the [`GameService`], which owns the store, the
//! session registry, the bundle cache and the broadcast hub.

use std::sync::Arc;

use mafia_core::{BroadcastHub, GameService};
use mafia_db::GameStore;

/// State shared by every handler.
pub struct AppState {
    /// Game operations.
    pub games: GameService,
}

impl AppState {
    /// Build the state over `store` with a fresh broadcast hub.
    pub fn new(store: Arc<dyn GameStore>, default_auto_sync_alive: bool) -> Self {
        Self {
            games: GameService::new(store, Arc::new(BroadcastHub::new()), default_auto_sync_alive),
        }
    }

    /// The store behind the game service.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        self.games.store()
    }

    /// The hub live sockets subscribe on.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        self.games.hub()
    }
}
