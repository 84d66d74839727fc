//! In-memory backend.
//!
//! All tables live behind one [`tokio::sync::Mutex`], so every operation
//! (including the combined update-and-log) is a single critical section.
//! IDs come from per-collection local counters starting at 1. Used for
//! tests and single-process development runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use mafia_types::{
    Friend, FriendId, Game, GameChanges, GameId, GameStatus, Log, LogId, NewFriend, NewGame,
    NewLog, NewPlayer, Player, PlayerChanges, PlayerId, User, UserId,
};
use tokio::sync::Mutex;

use crate::error::DbError;
use crate::store::{CacheInvalidator, GameStore, InvalidationHook};

/// Next-ID counters, one per collection.
#[derive(Debug, Default)]
struct Counters {
    users: i64,
    friends: i64,
    games: i64,
    players: i64,
    logs: i64,
}

fn bump(counter: &mut i64) -> i64 {
    *counter = counter.saturating_add(1);
    *counter
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    friends: BTreeMap<FriendId, Friend>,
    games: BTreeMap<GameId, Game>,
    players: BTreeMap<PlayerId, Player>,
    logs: BTreeMap<LogId, Log>,
    counters: Counters,
}

impl Tables {
    fn insert_log(&mut self, game_id: GameId, log: NewLog) -> Log {
        let id = LogId::new(bump(&mut self.counters.logs));
        let log = log.into_log(id, game_id);
        self.logs.insert(id, log.clone());
        log
    }
}

/// Backend keeping every collection in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    hook: InvalidationHook,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DbError> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.username == username) {
            return Err(DbError::Conflict(format!("username {username} already exists")));
        }
        let user = User {
            id: UserId::new(bump(&mut t.counters.users)),
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DbError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn update_user_password(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<Option<User>, DbError> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&user_id).map(|user| {
            password_hash.clone_into(&mut user.password_hash);
            user.clone()
        }))
    }

    async fn list_friends(&self, user_id: UserId) -> Result<Vec<Friend>, DbError> {
        let t = self.tables.lock().await;
        let mut friends: Vec<Friend> = t
            .friends
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        friends.sort_by_cached_key(|f| (f.name.to_lowercase(), f.id));
        Ok(friends)
    }

    async fn create_friend(&self, user_id: UserId, friend: NewFriend) -> Result<Friend, DbError> {
        let mut t = self.tables.lock().await;
        let friend = Friend {
            id: FriendId::new(bump(&mut t.counters.friends)),
            user_id,
            name: friend.name,
            description: friend.description,
            image: friend.image,
        };
        t.friends.insert(friend.id, friend.clone());
        Ok(friend)
    }

    async fn get_friend_for_user(
        &self,
        friend_id: FriendId,
        user_id: UserId,
    ) -> Result<Option<Friend>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.friends
            .get(&friend_id)
            .filter(|f| f.user_id == user_id)
            .cloned())
    }

    async fn delete_friend(&self, friend_id: FriendId, user_id: UserId) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        let owned = t.friends.get(&friend_id).is_some_and(|f| f.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        t.friends.remove(&friend_id);
        let mut touched = BTreeSet::new();
        for seat in t.players.values_mut().filter(|p| p.friend_id == Some(friend_id)) {
            seat.friend_id = None;
            touched.insert(seat.game_id);
        }
        drop(t);
        for game_id in touched {
            self.hook.notify(game_id);
        }
        Ok(true)
    }

    async fn create_game(&self, host_id: UserId, game: NewGame) -> Result<Game, DbError> {
        let mut t = self.tables.lock().await;
        let id = GameId::new(bump(&mut t.counters.games));
        let game = game.into_game(id, host_id);
        t.games.insert(id, game.clone());
        drop(t);
        self.hook.notify(id);
        Ok(game)
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, DbError> {
        Ok(self.tables.lock().await.games.get(&game_id).cloned())
    }

    async fn update_game(
        &self,
        game_id: GameId,
        changes: &GameChanges,
    ) -> Result<Option<Game>, DbError> {
        let mut t = self.tables.lock().await;
        let updated = t.games.get_mut(&game_id).map(|game| {
            game.apply(changes);
            game.clone()
        });
        drop(t);
        if updated.is_some() {
            self.hook.notify(game_id);
        }
        Ok(updated)
    }

    async fn update_game_with_log(
        &self,
        game_id: GameId,
        changes: &GameChanges,
        log: NewLog,
    ) -> Result<Option<(Game, Log)>, DbError> {
        let mut t = self.tables.lock().await;
        let Some(game) = t.games.get_mut(&game_id) else {
            return Ok(None);
        };
        game.apply(changes);
        let game = game.clone();
        let log = t.insert_log(game_id, log);
        drop(t);
        self.hook.notify(game_id);
        Ok(Some((game, log)))
    }

    async fn list_games(
        &self,
        host_id: UserId,
        status: Option<GameStatus>,
    ) -> Result<Vec<Game>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.games
            .values()
            .rev()
            .filter(|g| g.host_id == host_id && status.is_none_or(|s| g.status == s))
            .cloned()
            .collect())
    }

    async fn add_player(&self, game_id: GameId, player: NewPlayer) -> Result<Player, DbError> {
        let mut t = self.tables.lock().await;
        if !t.games.contains_key(&game_id) {
            return Err(DbError::KeyNotFound(format!("game {game_id}")));
        }
        let id = PlayerId::new(bump(&mut t.counters.players));
        let player = player.into_player(id, game_id);
        t.players.insert(id, player.clone());
        drop(t);
        self.hook.notify(game_id);
        Ok(player)
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        game_id: GameId,
        changes: &PlayerChanges,
    ) -> Result<Option<Player>, DbError> {
        let mut t = self.tables.lock().await;
        let updated = t
            .players
            .get_mut(&player_id)
            .filter(|p| p.game_id == game_id)
            .map(|player| {
                player.apply(changes);
                player.clone()
            });
        drop(t);
        if updated.is_some() {
            self.hook.notify(game_id);
        }
        Ok(updated)
    }

    async fn get_player(
        &self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> Result<Option<Player>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.players
            .get(&player_id)
            .filter(|p| p.game_id == game_id)
            .cloned())
    }

    async fn list_players(&self, game_id: GameId) -> Result<Vec<Player>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn add_log(&self, game_id: GameId, log: NewLog) -> Result<Log, DbError> {
        let mut t = self.tables.lock().await;
        if !t.games.contains_key(&game_id) {
            return Err(DbError::KeyNotFound(format!("game {game_id}")));
        }
        let log = t.insert_log(game_id, log);
        drop(t);
        self.hook.notify(game_id);
        Ok(log)
    }

    async fn list_logs(&self, game_id: GameId) -> Result<Vec<Log>, DbError> {
        let t = self.tables.lock().await;
        let mut logs: Vec<Log> = t
            .logs
            .values()
            .filter(|l| l.game_id == game_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| (l.timestamp, l.id));
        Ok(logs)
    }

    fn set_cache_invalidator(&self, invalidator: Arc<dyn CacheInvalidator>) {
        self.hook.set(invalidator);
    }

    async fn reset(&self) -> Result<(), DbError> {
        *self.tables.lock().await = Tables::default();
        tracing::debug!("In-memory store reset");
        Ok(())
    }
}
