//! Process-wide registry of live game sessions.
//!
//! The registry is built once at startup and shared by handle. Each game
//! has exactly one [`GameSession`] behind its own [`Mutex`]; an operation
//! holds the session's lock from load through broadcast, so operations on
//! one game are serialized while different games proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use mafia_db::GameStore;
use mafia_types::{GameId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::broadcast::BroadcastHub;
use crate::error::GameError;
use crate::session::GameSession;

/// Map of game ID to its single live session.
pub struct SessionRegistry {
    store: Arc<dyn GameStore>,
    hub: Arc<BroadcastHub>,
    sessions: RwLock<HashMap<GameId, Arc<Mutex<GameSession>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(store: Arc<dyn GameStore>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            store,
            hub,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The store sessions persist through.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// The hub sessions broadcast on.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Register a freshly created session, returning the shared handle.
    ///
    /// If a session for the same game already exists it is kept.
    pub async fn insert(&self, session: GameSession) -> Arc<Mutex<GameSession>> {
        let game_id = session.id();
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(game_id)
                .or_insert_with(|| Arc::new(Mutex::new(session))),
        )
    }

    /// Return the shared session for `game_id`, loading it on first use.
    ///
    /// Concurrent first accesses may each load the game, but only one
    /// session is kept and all callers receive it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the game does not exist.
    pub async fn get_or_load(&self, game_id: GameId) -> Result<Arc<Mutex<GameSession>>, GameError> {
        if let Some(session) = self.sessions.read().await.get(&game_id) {
            return Ok(Arc::clone(session));
        }

        let loaded =
            GameSession::load(game_id, Arc::clone(&self.store), Arc::clone(&self.hub)).await?;
        tracing::debug!(%game_id, "Loaded game session");
        Ok(self.insert(loaded).await)
    }

    /// Lock the session for one operation.
    ///
    /// When `caller` is given, the caller must be the game's host.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the game does not exist and
    /// [`GameError::Forbidden`] if `caller` is not the host.
    pub async fn acquire(
        &self,
        game_id: GameId,
        caller: Option<UserId>,
    ) -> Result<OwnedMutexGuard<GameSession>, GameError> {
        let session = self.get_or_load(game_id).await?.lock_owned().await;
        if let Some(caller) = caller {
            session.ensure_host(caller)?;
        }
        Ok(session)
    }

    /// Drop the cached session for `game_id`; the next access reloads it.
    pub async fn evict(&self, game_id: GameId) -> bool {
        self.sessions.write().await.remove(&game_id).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
