//! The persistence contract shared by every backend.
//!
//! [`GameStore`] is object-safe and shared as `Arc<dyn GameStore>`; the
//! session manager and the HTTP layer never know which backend they run
//! against. Every implementation must honor the same ordering and
//! ownership rules:
//!
//! | Operation | Ordering / rule |
//! |-----------|-----------------|
//! | `list_friends` | name, case-insensitive, then ID |
//! | `list_games` | newest ID first |
//! | `list_players` | ID ascending |
//! | `list_logs` | `(timestamp, id)` ascending |
//! | `update_player` | absent unless the player belongs to the game |
//! | `update_game_with_log` | atomic: both writes visible, or neither |

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use mafia_types::{
    Friend, FriendId, Game, GameAggregate, GameChanges, GameId, GameStatus, Log, NewFriend,
    NewGame, NewLog, NewPlayer, Player, PlayerChanges, PlayerId, User, UserId,
};

use crate::error::DbError;

/// Listener told about every mutation that affects a game, so read caches
/// can drop stale bundles.
pub trait CacheInvalidator: Send + Sync {
    /// Drop anything cached for `game_id`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the store and otherwise ignored.
    fn invalidate_game(&self, game_id: GameId) -> anyhow::Result<()>;
}

impl<F> CacheInvalidator for F
where
    F: Fn(GameId) -> anyhow::Result<()> + Send + Sync,
{
    fn invalidate_game(&self, game_id: GameId) -> anyhow::Result<()> {
        self(game_id)
    }
}

/// Holder for the optional invalidation listener embedded in each backend.
#[derive(Default)]
pub struct InvalidationHook {
    listener: RwLock<Option<Arc<dyn CacheInvalidator>>>,
}

impl InvalidationHook {
    /// Install (or replace) the listener.
    pub fn set(&self, listener: Arc<dyn CacheInvalidator>) {
        let mut slot = self.listener.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(listener);
    }

    /// Notify the listener, if any. Listener failures never propagate.
    pub fn notify(&self, game_id: GameId) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            if let Err(e) = listener.invalidate_game(game_id) {
                tracing::warn!(%game_id, error = %e, "cache invalidation failed");
            }
        }
    }
}

/// Uniform persistence contract for users, friends, games, players and logs.
#[async_trait]
pub trait GameStore: Send + Sync {
    // -- Users ---------------------------------------------------------------

    /// Create a user. Fails with [`DbError::Conflict`] if the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DbError>;

    /// Look up a user by username.
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError>;

    /// Look up a user by ID.
    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DbError>;

    /// Replace a user's password hash.
    async fn update_user_password(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<Option<User>, DbError>;

    // -- Friends -------------------------------------------------------------

    /// List a user's friends by name, case-insensitive.
    async fn list_friends(&self, user_id: UserId) -> Result<Vec<Friend>, DbError>;

    /// Create a friend owned by `user_id`.
    async fn create_friend(&self, user_id: UserId, friend: NewFriend) -> Result<Friend, DbError>;

    /// Look up a friend, absent unless owned by `user_id`.
    async fn get_friend_for_user(
        &self,
        friend_id: FriendId,
        user_id: UserId,
    ) -> Result<Option<Friend>, DbError>;

    /// Delete a friend. Returns `false` if not found or not owned.
    async fn delete_friend(&self, friend_id: FriendId, user_id: UserId) -> Result<bool, DbError>;

    // -- Games ---------------------------------------------------------------

    /// Create a game hosted by `host_id`.
    async fn create_game(&self, host_id: UserId, game: NewGame) -> Result<Game, DbError>;

    /// Look up a game.
    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, DbError>;

    /// Apply a partial update to a game.
    async fn update_game(
        &self,
        game_id: GameId,
        changes: &GameChanges,
    ) -> Result<Option<Game>, DbError>;

    /// Atomically apply a partial update and append a log entry.
    ///
    /// Returns `None`, with no log written, if the game does not exist.
    async fn update_game_with_log(
        &self,
        game_id: GameId,
        changes: &GameChanges,
        log: NewLog,
    ) -> Result<Option<(Game, Log)>, DbError>;

    /// List games hosted by `host_id`, newest first, optionally by status.
    async fn list_games(
        &self,
        host_id: UserId,
        status: Option<GameStatus>,
    ) -> Result<Vec<Game>, DbError>;

    // -- Players -------------------------------------------------------------

    /// Seat a player. Fails with [`DbError::KeyNotFound`] if the game is missing.
    async fn add_player(&self, game_id: GameId, player: NewPlayer) -> Result<Player, DbError>;

    /// Apply a partial update to a player of `game_id`.
    async fn update_player(
        &self,
        player_id: PlayerId,
        game_id: GameId,
        changes: &PlayerChanges,
    ) -> Result<Option<Player>, DbError>;

    /// Look up a player of `game_id`.
    async fn get_player(
        &self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> Result<Option<Player>, DbError>;

    /// List a game's players by ID.
    async fn list_players(&self, game_id: GameId) -> Result<Vec<Player>, DbError>;

    // -- Logs ----------------------------------------------------------------

    /// Append a log entry. Fails with [`DbError::KeyNotFound`] if the game is missing.
    async fn add_log(&self, game_id: GameId, log: NewLog) -> Result<Log, DbError>;

    /// List a game's logs by `(timestamp, id)`.
    async fn list_logs(&self, game_id: GameId) -> Result<Vec<Log>, DbError>;

    // -- Aggregate -----------------------------------------------------------

    /// Read a game with its players and logs.
    async fn get_game_bundle(&self, game_id: GameId) -> Result<Option<GameAggregate>, DbError> {
        let Some(game) = self.get_game(game_id).await? else {
            return Ok(None);
        };
        let players = self.list_players(game_id).await?;
        let logs = self.list_logs(game_id).await?;
        Ok(Some(GameAggregate::new(game, players, logs)))
    }

    // -- Maintenance ---------------------------------------------------------

    /// Install the listener notified after every game-affecting mutation.
    fn set_cache_invalidator(&self, invalidator: Arc<dyn CacheInvalidator>);

    /// Clear all state. Only the in-memory backend does anything.
    async fn reset(&self) -> Result<(), DbError> {
        Ok(())
    }
}
