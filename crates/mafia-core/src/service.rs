//! Game creation, listing and read access.
//!
//! [`GameService`] is the entry point the transport layer holds. It
//! creates games (seating players from names or saved friends), lists a
//! host's games, serves read-only snapshots through the [`BundleCache`],
//! and hands out locked sessions for mutations. Sessions of finished
//! games leave the registry on [`GameService::release`].

use std::sync::Arc;

use mafia_db::{BundleCache, GameStore};
use mafia_types::{
    AliveView, CreateGameRequest, Game, GameAggregate, GameId, GameSnapshot, GameStatus, NewGame,
    NewPlayer, UserId,
};
use rand::seq::IndexedRandom;
use tokio::sync::OwnedMutexGuard;

use crate::broadcast::BroadcastHub;
use crate::error::GameError;
use crate::registry::SessionRegistry;
use crate::session::{GameSession, events};

/// Avatars handed to players that have neither an explicit avatar nor a
/// friend image.
pub const ANIMAL_AVATARS: [&str; 20] = [
    "🦊", "🐻", "🐼", "🦁", "🐯", "🐮", "🐸", "🐵", "🐶", "🐱", "🦄", "🦉", "🦜", "🦇", "🐢",
    "🐙", "🐳", "🐬", "🦕", "🦓",
];

/// Pick a random animal avatar.
pub fn random_animal_avatar() -> String {
    ANIMAL_AVATARS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("🦊")
        .to_owned()
}

/// Entry point for every game operation.
pub struct GameService {
    registry: Arc<SessionRegistry>,
    cache: Arc<BundleCache>,
    default_auto_sync_alive: bool,
}

impl GameService {
    /// Build the service over `store`, installing a [`BundleCache`] as
    /// the store's invalidation listener.
    pub fn new(store: Arc<dyn GameStore>, hub: Arc<BroadcastHub>, default_auto_sync_alive: bool) -> Self {
        let cache = BundleCache::attach(Arc::clone(&store));
        Self {
            registry: Arc::new(SessionRegistry::new(store, hub)),
            cache,
            default_auto_sync_alive,
        }
    }

    /// The store behind every session.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        self.registry.store()
    }

    /// The broadcast hub live subscribers listen on.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        self.registry.hub()
    }

    /// The session registry.
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Create a pending game hosted by `host_id` and seat its players.
    ///
    /// Blank names are skipped. A seat with a `friend_id` takes the
    /// friend's name; the avatar comes from the seat, else the friend's
    /// image, else a random animal.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] if a friend is not owned by the
    /// host, or [`GameError`] if the store fails.
    pub async fn create_game(
        &self,
        host_id: UserId,
        request: &CreateGameRequest,
    ) -> Result<GameSnapshot, GameError> {
        let store = self.store();
        let auto_sync = request
            .auto_sync_alive
            .unwrap_or(self.default_auto_sync_alive);
        let game = store
            .create_game(host_id, NewGame::with_auto_sync(auto_sync))
            .await?;

        let mut players = Vec::new();
        for spec in request.seat_specs() {
            let raw_name = spec.name.trim();
            if raw_name.is_empty() {
                continue;
            }
            let friend = match spec.friend_id {
                Some(friend_id) => Some(
                    store
                        .get_friend_for_user(friend_id, host_id)
                        .await?
                        .ok_or_else(|| GameError::BadRequest("Invalid friend selection".to_owned()))?,
                ),
                None => None,
            };

            let name = friend
                .as_ref()
                .map_or(raw_name, |f| f.name.trim())
                .to_owned();
            let avatar = non_blank(spec.avatar.as_deref())
                .or_else(|| friend.as_ref().and_then(|f| non_blank(f.image.as_deref())))
                .map_or_else(random_animal_avatar, str::to_owned);

            let player = store
                .add_player(
                    game.id,
                    NewPlayer {
                        name,
                        avatar: Some(avatar),
                        friend_id: friend.map(|f| f.id),
                    },
                )
                .await?;
            players.push(player);
        }

        tracing::info!(game_id = %game.id, %host_id, players = players.len(), "Game created");
        let session = GameSession::new(
            GameAggregate::new(game, players, Vec::new()),
            Arc::clone(store),
            Arc::clone(self.hub()),
        );
        let handle = self.registry.insert(session).await;
        let session = handle.lock().await;
        session.broadcast(events::GAME_CREATED, None);
        Ok(session.snapshot(AliveView::Authoritative))
    }

    /// List games hosted by `host_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GameError`] if the store fails.
    pub async fn list_games(
        &self,
        host_id: UserId,
        status: Option<GameStatus>,
    ) -> Result<Vec<Game>, GameError> {
        Ok(self.store().list_games(host_id, status).await?)
    }

    /// Read a game's current state without locking its session.
    ///
    /// When `caller` is given, the caller must be the host.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] or [`GameError::Forbidden`].
    pub async fn snapshot(
        &self,
        game_id: GameId,
        caller: Option<UserId>,
        view: AliveView,
    ) -> Result<GameSnapshot, GameError> {
        let aggregate = self
            .cache
            .get(game_id)
            .await?
            .ok_or_else(GameError::game_not_found)?;
        if let Some(caller) = caller {
            if aggregate.host_id() != caller {
                return Err(GameError::Forbidden("Not permitted for this game".to_owned()));
            }
        }
        Ok(GameSnapshot::from_aggregate(&aggregate, view))
    }

    /// Lock a game's session for one mutation.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] or [`GameError::Forbidden`].
    pub async fn session(
        &self,
        game_id: GameId,
        caller: Option<UserId>,
    ) -> Result<OwnedMutexGuard<GameSession>, GameError> {
        self.registry.acquire(game_id, caller).await
    }

    /// Unlock a session after an operation, dropping it from the
    /// registry once its game is finished.
    ///
    /// A finished game's next access reloads it from the store. Returns
    /// whether the session was evicted.
    pub async fn release(&self, session: OwnedMutexGuard<GameSession>) -> bool {
        let game_id = session.id();
        let finished = session.aggregate().game.status == GameStatus::Finished;
        drop(session);
        if !finished {
            return false;
        }
        let evicted = self.registry.evict(game_id).await;
        if evicted {
            tracing::debug!(%game_id, "Released finished game session");
        }
        evicted
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
