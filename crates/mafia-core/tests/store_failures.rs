//! Session behavior when the store refuses a combined update.
//!
//! The store used here delegates to [`MemoryStore`] but can be switched to
//! answer `update_game_with_log` with "game absent" or with a backend
//! error. A failed operation must leave the session untouched and publish
//! nothing.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use mafia_core::{BroadcastHub, ErrorKind, GameError, GameService};
use mafia_db::{CacheInvalidator, DbError, GameStore, MemoryStore};
use mafia_types::{
    AliveView, CreateGameRequest, Friend, FriendId, Game, GameChanges, GameId, GamePhase,
    GameStatus, Log, NewFriend, NewGame, NewLog, NewPlayer, Player, PlayerChanges, PlayerId, User,
    UserId,
};

const PASS: u8 = 0;
const ABSENT: u8 = 1;
const BROKEN: u8 = 2;

/// [`MemoryStore`] with a switchable combined update.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    mode: AtomicU8,
}

impl FlakyStore {
    fn set_mode(&self, mode: u8) {
        self.mode.store(mode, Ordering::SeqCst);
    }
}

#[async_trait]
impl GameStore for FlakyStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DbError> {
        self.inner.create_user(username, password_hash).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        self.inner.get_user_by_username(username).await
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DbError> {
        self.inner.get_user_by_id(user_id).await
    }

    async fn update_user_password(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<Option<User>, DbError> {
        self.inner.update_user_password(user_id, password_hash).await
    }

    async fn list_friends(&self, user_id: UserId) -> Result<Vec<Friend>, DbError> {
        self.inner.list_friends(user_id).await
    }

    async fn create_friend(&self, user_id: UserId, friend: NewFriend) -> Result<Friend, DbError> {
        self.inner.create_friend(user_id, friend).await
    }

    async fn get_friend_for_user(
        &self,
        friend_id: FriendId,
        user_id: UserId,
    ) -> Result<Option<Friend>, DbError> {
        self.inner.get_friend_for_user(friend_id, user_id).await
    }

    async fn delete_friend(&self, friend_id: FriendId, user_id: UserId) -> Result<bool, DbError> {
        self.inner.delete_friend(friend_id, user_id).await
    }

    async fn create_game(&self, host_id: UserId, game: NewGame) -> Result<Game, DbError> {
        self.inner.create_game(host_id, game).await
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, DbError> {
        self.inner.get_game(game_id).await
    }

    async fn update_game(
        &self,
        game_id: GameId,
        changes: &GameChanges,
    ) -> Result<Option<Game>, DbError> {
        self.inner.update_game(game_id, changes).await
    }

    async fn update_game_with_log(
        &self,
        game_id: GameId,
        changes: &GameChanges,
        log: NewLog,
    ) -> Result<Option<(Game, Log)>, DbError> {
        match self.mode.load(Ordering::SeqCst) {
            ABSENT => Ok(None),
            BROKEN => Err(DbError::Config("store offline".to_owned())),
            _ => self.inner.update_game_with_log(game_id, changes, log).await,
        }
    }

    async fn list_games(
        &self,
        host_id: UserId,
        status: Option<GameStatus>,
    ) -> Result<Vec<Game>, DbError> {
        self.inner.list_games(host_id, status).await
    }

    async fn add_player(&self, game_id: GameId, player: NewPlayer) -> Result<Player, DbError> {
        self.inner.add_player(game_id, player).await
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        game_id: GameId,
        changes: &PlayerChanges,
    ) -> Result<Option<Player>, DbError> {
        self.inner.update_player(player_id, game_id, changes).await
    }

    async fn get_player(
        &self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> Result<Option<Player>, DbError> {
        self.inner.get_player(game_id, player_id).await
    }

    async fn list_players(&self, game_id: GameId) -> Result<Vec<Player>, DbError> {
        self.inner.list_players(game_id).await
    }

    async fn add_log(&self, game_id: GameId, log: NewLog) -> Result<Log, DbError> {
        self.inner.add_log(game_id, log).await
    }

    async fn list_logs(&self, game_id: GameId) -> Result<Vec<Log>, DbError> {
        self.inner.list_logs(game_id).await
    }

    fn set_cache_invalidator(&self, invalidator: Arc<dyn CacheInvalidator>) {
        self.inner.set_cache_invalidator(invalidator);
    }
}

async fn setup() -> (Arc<FlakyStore>, GameService, UserId, GameId) {
    let store = Arc::new(FlakyStore::default());
    let host = store.create_user("host", "hash").await.unwrap().id;
    let service = GameService::new(
        Arc::clone(&store) as Arc<dyn GameStore>,
        Arc::new(BroadcastHub::new()),
        true,
    );
    let request = CreateGameRequest {
        player_names: ["Alice", "Bob", "Cara"].map(str::to_owned).to_vec(),
        ..CreateGameRequest::default()
    };
    let game_id = service.create_game(host, &request).await.unwrap().game_id;
    (store, service, host, game_id)
}

#[tokio::test]
async fn absent_game_on_start_is_internal_and_changes_nothing() {
    let (store, service, host, game_id) = setup().await;
    let mut rx = service.hub().subscribe(game_id);
    let mut s = service.session(game_id, Some(host)).await.unwrap();
    let before = s.snapshot(AliveView::Authoritative);

    store.set_mode(ABSENT);
    let err = s.start_game().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.to_string(), "Failed to update game state");
    assert_eq!(s.snapshot(AliveView::Authoritative), before);
    assert_eq!(before.status, GameStatus::Pending);
    assert!(rx.try_recv().is_err());

    store.set_mode(PASS);
    let started = s.start_game().await.unwrap();
    assert_eq!(started.status, GameStatus::Active);
    assert_eq!(rx.try_recv().unwrap().event, mafia_core::events::GAME_STARTED);
}

#[tokio::test]
async fn failed_phase_change_and_finish_leave_the_session_alone() {
    let (store, service, host, game_id) = setup().await;
    let mut s = service.session(game_id, Some(host)).await.unwrap();
    s.start_game().await.unwrap();
    let mut rx = service.hub().subscribe(game_id);
    let before = s.snapshot(AliveView::Authoritative);

    store.set_mode(ABSENT);
    let err = s.change_phase(GamePhase::Night).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.to_string(), "Failed to change phase");

    let err = s.finish_game("Mafia").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.to_string(), "Failed to finish game");

    store.set_mode(BROKEN);
    let err = s.change_phase(GamePhase::Night).await.unwrap_err();
    assert!(matches!(err, GameError::Store(DbError::Config(_))));
    assert_eq!(err.kind(), ErrorKind::Internal);

    assert_eq!(s.snapshot(AliveView::Authoritative), before);
    assert_eq!(before.phase, GamePhase::Day);
    assert!(rx.try_recv().is_err());

    store.set_mode(PASS);
    let stored = store.get_game(game_id).await.unwrap().unwrap();
    assert_eq!(stored.status, GameStatus::Active);
    assert_eq!(stored.current_phase, GamePhase::Day);
    assert_eq!(store.list_logs(game_id).await.unwrap().len(), before.logs.len());
}
