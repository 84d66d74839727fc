//! Document [`GameStore`] over `Dragonfly`.
//!
//! Entities are JSON documents and relations are ID sets (see
//! [`crate::dragonfly`] for the key layout). IDs come from an
//! [`IdAllocator`] backed by `counter:{collection}` keys.
//!
//! Updates are optimistic: read the document, apply the change in Rust,
//! then write it back with a Lua compare-and-swap that fails if the
//! document changed in between. A lost race is retried.

use std::sync::Arc;

use async_trait::async_trait;
use mafia_types::{
    Friend, FriendId, Game, GameChanges, GameId, GameStatus, Log, LogId, NewFriend, NewGame,
    NewLog, NewPlayer, Player, PlayerChanges, PlayerId, User, UserId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;
use crate::id_alloc::{Collection, IdAllocator};
use crate::store::{CacheInvalidator, GameStore, InvalidationHook};

/// How many times a compare-and-swap is retried before giving up.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Replace `KEYS[1]` with `ARGV[2]` if it still holds `ARGV[1]`.
///
/// Returns 1 on success, 0 if the key is gone, -1 if it changed.
const CAS_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then return 0 end
if current ~= ARGV[1] then return -1 end
redis.call('SET', KEYS[1], ARGV[2])
return 1
";

/// [`CAS_SCRIPT`] on the game document plus, on success, the new log
/// document at `KEYS[2]` and its ID `ARGV[4]` added to the set `KEYS[3]`.
const CAS_WITH_LOG_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then return 0 end
if current ~= ARGV[1] then return -1 end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
redis.call('SADD', KEYS[3], ARGV[4])
return 1
";

/// Outcome codes returned by the CAS scripts.
const CAS_MISSING: i64 = 0;
const CAS_APPLIED: i64 = 1;

fn user_key(id: UserId) -> String {
    format!("user:{id}")
}

fn username_key(username: &str) -> String {
    format!("user:by_name:{username}")
}

fn user_friends_key(id: UserId) -> String {
    format!("user:{id}:friends")
}

fn user_games_key(id: UserId) -> String {
    format!("user:{id}:games")
}

fn friend_key(id: FriendId) -> String {
    format!("friend:{id}")
}

fn game_key(id: GameId) -> String {
    format!("game:{id}")
}

fn game_players_key(id: GameId) -> String {
    format!("game:{id}:players")
}

fn game_logs_key(id: GameId) -> String {
    format!("game:{id}:logs")
}

fn player_key(id: PlayerId) -> String {
    format!("player:{id}")
}

fn log_key(id: LogId) -> String {
    format!("log:{id}")
}

/// Backend storing every collection as `Dragonfly` documents.
pub struct DragonflyStore {
    pool: DragonflyPool,
    ids: IdAllocator<DragonflyPool>,
    hook: InvalidationHook,
}

impl DragonflyStore {
    /// Create a store reserving IDs in blocks of `id_block_size`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if `id_block_size` is not positive.
    pub fn new(pool: DragonflyPool, id_block_size: i64) -> Result<Self, DbError> {
        let ids = IdAllocator::new(pool.clone(), id_block_size)?;
        Ok(Self {
            pool,
            ids,
            hook: InvalidationHook::default(),
        })
    }

    /// Read-modify-write the document at `key` with compare-and-swap.
    ///
    /// `edit` returns `false` to abort without writing (e.g. an ownership
    /// mismatch). Returns `None` if the document is missing or the edit
    /// was aborted.
    async fn cas_update<T, F>(&self, key: &str, mut edit: F) -> Result<Option<T>, DbError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut(&mut T) -> bool + Send,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(raw) = self.pool.get_raw(key).await? else {
                return Ok(None);
            };
            let mut doc: T = serde_json::from_str(&raw)?;
            if !edit(&mut doc) {
                return Ok(None);
            }
            let updated = serde_json::to_string(&doc)?;
            let status = self
                .pool
                .eval_status(CAS_SCRIPT, vec![key.to_owned()], vec![raw, updated])
                .await?;
            match status {
                CAS_APPLIED => return Ok(Some(doc)),
                CAS_MISSING => return Ok(None),
                _ => tracing::debug!(key, "Compare-and-swap lost a race, retrying"),
            }
        }
        Err(DbError::Conflict(format!(
            "{key} kept changing during update"
        )))
    }

    async fn game_exists(&self, game_id: GameId) -> Result<bool, DbError> {
        Ok(self.pool.get_raw(&game_key(game_id)).await?.is_some())
    }
}

#[async_trait]
impl GameStore for DragonflyStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DbError> {
        let id = UserId::new(self.ids.next_id(Collection::Users).await?);
        if !self
            .pool
            .set_nx(&username_key(username), &id.to_string())
            .await?
        {
            return Err(DbError::Conflict(format!("username {username} already exists")));
        }
        let user = User {
            id,
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        self.pool.set_json(&user_key(id), &user).await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let Some(raw_id) = self.pool.get_raw(&username_key(username)).await? else {
            return Ok(None);
        };
        let id = raw_id
            .parse::<i64>()
            .map_err(|e| DbError::Corrupt(format!("username index {username}: {e}")))?;
        self.get_user_by_id(UserId::new(id)).await
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DbError> {
        self.pool.get_json(&user_key(user_id)).await
    }

    async fn update_user_password(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<Option<User>, DbError> {
        self.cas_update(&user_key(user_id), |user: &mut User| {
            password_hash.clone_into(&mut user.password_hash);
            true
        })
        .await
    }

    async fn list_friends(&self, user_id: UserId) -> Result<Vec<Friend>, DbError> {
        let ids = self.pool.members(&user_friends_key(user_id)).await?;
        let keys = ids.into_iter().map(|id| friend_key(FriendId::new(id))).collect();
        let mut friends: Vec<Friend> = self.pool.mget_json(keys).await?;
        friends.retain(|f| f.user_id == user_id);
        friends.sort_by_cached_key(|f| (f.name.to_lowercase(), f.id));
        Ok(friends)
    }

    async fn create_friend(&self, user_id: UserId, friend: NewFriend) -> Result<Friend, DbError> {
        let id = FriendId::new(self.ids.next_id(Collection::Friends).await?);
        let friend = Friend {
            id,
            user_id,
            name: friend.name,
            description: friend.description,
            image: friend.image,
        };
        self.pool.set_json(&friend_key(id), &friend).await?;
        self.pool
            .add_member(&user_friends_key(user_id), id.into_inner())
            .await?;
        Ok(friend)
    }

    async fn get_friend_for_user(
        &self,
        friend_id: FriendId,
        user_id: UserId,
    ) -> Result<Option<Friend>, DbError> {
        let friend: Option<Friend> = self.pool.get_json(&friend_key(friend_id)).await?;
        Ok(friend.filter(|f| f.user_id == user_id))
    }

    async fn delete_friend(&self, friend_id: FriendId, user_id: UserId) -> Result<bool, DbError> {
        if self.get_friend_for_user(friend_id, user_id).await?.is_none() {
            return Ok(false);
        }
        self.pool.delete(vec![friend_key(friend_id)]).await?;
        self.pool
            .remove_member(&user_friends_key(user_id), friend_id.into_inner())
            .await?;

        // Friends are only seated in their owner's games.
        for game_id in self.pool.members(&user_games_key(user_id)).await? {
            let game_id = GameId::new(game_id);
            let mut touched = false;
            for seat in self.list_players(game_id).await? {
                if seat.friend_id != Some(friend_id) {
                    continue;
                }
                let detached = self
                    .cas_update(&player_key(seat.id), |player: &mut Player| {
                        if player.friend_id != Some(friend_id) {
                            return false;
                        }
                        player.friend_id = None;
                        true
                    })
                    .await?;
                touched |= detached.is_some();
            }
            if touched {
                self.hook.notify(game_id);
            }
        }
        Ok(true)
    }

    async fn create_game(&self, host_id: UserId, game: NewGame) -> Result<Game, DbError> {
        let id = GameId::new(self.ids.next_id(Collection::Games).await?);
        let game = game.into_game(id, host_id);
        self.pool.set_json(&game_key(id), &game).await?;
        self.pool
            .add_member(&user_games_key(host_id), id.into_inner())
            .await?;
        self.hook.notify(id);
        tracing::debug!(game_id = %id, %host_id, "Created game");
        Ok(game)
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, DbError> {
        self.pool.get_json(&game_key(game_id)).await
    }

    async fn update_game(
        &self,
        game_id: GameId,
        changes: &GameChanges,
    ) -> Result<Option<Game>, DbError> {
        let game = self
            .cas_update(&game_key(game_id), |game: &mut Game| {
                game.apply(changes);
                true
            })
            .await?;
        if game.is_some() {
            self.hook.notify(game_id);
        }
        Ok(game)
    }

    async fn update_game_with_log(
        &self,
        game_id: GameId,
        changes: &GameChanges,
        log: NewLog,
    ) -> Result<Option<(Game, Log)>, DbError> {
        let key = game_key(game_id);
        if !self.game_exists(game_id).await? {
            return Ok(None);
        }
        let log_id = LogId::new(self.ids.next_id(Collection::Logs).await?);
        let log = log.into_log(log_id, game_id);
        let log_json = serde_json::to_string(&log)?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(raw) = self.pool.get_raw(&key).await? else {
                return Ok(None);
            };
            let mut game: Game = serde_json::from_str(&raw)?;
            game.apply(changes);
            let updated = serde_json::to_string(&game)?;
            let status = self
                .pool
                .eval_status(
                    CAS_WITH_LOG_SCRIPT,
                    vec![key.clone(), log_key(log_id), game_logs_key(game_id)],
                    vec![raw, updated, log_json.clone(), log_id.to_string()],
                )
                .await?;
            match status {
                CAS_APPLIED => {
                    self.hook.notify(game_id);
                    return Ok(Some((game, log)));
                }
                CAS_MISSING => return Ok(None),
                _ => tracing::debug!(%game_id, "Combined update lost a race, retrying"),
            }
        }
        Err(DbError::Conflict(format!(
            "{key} kept changing during update"
        )))
    }

    async fn list_games(
        &self,
        host_id: UserId,
        status: Option<GameStatus>,
    ) -> Result<Vec<Game>, DbError> {
        let ids = self.pool.members(&user_games_key(host_id)).await?;
        let keys = ids
            .into_iter()
            .rev()
            .map(|id| game_key(GameId::new(id)))
            .collect();
        let games: Vec<Game> = self.pool.mget_json(keys).await?;
        Ok(games
            .into_iter()
            .filter(|g| g.host_id == host_id && status.is_none_or(|s| g.status == s))
            .collect())
    }

    async fn add_player(&self, game_id: GameId, player: NewPlayer) -> Result<Player, DbError> {
        if !self.game_exists(game_id).await? {
            return Err(DbError::KeyNotFound(format!("game {game_id}")));
        }
        let id = PlayerId::new(self.ids.next_id(Collection::Players).await?);
        let player = player.into_player(id, game_id);
        self.pool.set_json(&player_key(id), &player).await?;
        self.pool
            .add_member(&game_players_key(game_id), id.into_inner())
            .await?;
        self.hook.notify(game_id);
        Ok(player)
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        game_id: GameId,
        changes: &PlayerChanges,
    ) -> Result<Option<Player>, DbError> {
        let player = self
            .cas_update(&player_key(player_id), |player: &mut Player| {
                if player.game_id != game_id {
                    return false;
                }
                player.apply(changes);
                true
            })
            .await?;
        if player.is_some() {
            self.hook.notify(game_id);
        }
        Ok(player)
    }

    async fn get_player(
        &self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> Result<Option<Player>, DbError> {
        let player: Option<Player> = self.pool.get_json(&player_key(player_id)).await?;
        Ok(player.filter(|p| p.game_id == game_id))
    }

    async fn list_players(&self, game_id: GameId) -> Result<Vec<Player>, DbError> {
        let ids = self.pool.members(&game_players_key(game_id)).await?;
        let keys = ids.into_iter().map(|id| player_key(PlayerId::new(id))).collect();
        let players: Vec<Player> = self.pool.mget_json(keys).await?;
        Ok(players.into_iter().filter(|p| p.game_id == game_id).collect())
    }

    async fn add_log(&self, game_id: GameId, log: NewLog) -> Result<Log, DbError> {
        if !self.game_exists(game_id).await? {
            return Err(DbError::KeyNotFound(format!("game {game_id}")));
        }
        let id = LogId::new(self.ids.next_id(Collection::Logs).await?);
        let log = log.into_log(id, game_id);
        self.pool.set_json(&log_key(id), &log).await?;
        self.pool
            .add_member(&game_logs_key(game_id), id.into_inner())
            .await?;
        self.hook.notify(game_id);
        Ok(log)
    }

    async fn list_logs(&self, game_id: GameId) -> Result<Vec<Log>, DbError> {
        let ids = self.pool.members(&game_logs_key(game_id)).await?;
        let keys = ids.into_iter().map(|id| log_key(LogId::new(id))).collect();
        let mut logs: Vec<Log> = self.pool.mget_json(keys).await?;
        logs.retain(|l| l.game_id == game_id);
        logs.sort_by_key(|l| (l.timestamp, l.id));
        Ok(logs)
    }

    fn set_cache_invalidator(&self, invalidator: Arc<dyn CacheInvalidator>) {
        self.hook.set(invalidator);
    }
}
