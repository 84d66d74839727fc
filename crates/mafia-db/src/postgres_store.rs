//! Relational [`GameStore`] over `PostgreSQL`.
//!
//! Each collection has its own table (see `migrations/`). Partial updates
//! use `COALESCE` so unset fields keep their stored value, and
//! [`GameStore::update_game_with_log`] runs inside one transaction.
//! [`PostgresStore::connect`] applies the embedded migrations before the
//! store is handed out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mafia_types::{
    Friend, FriendId, Game, GameChanges, GameId, GamePhase, GameStatus, Log, LogId, NewFriend,
    NewGame, NewLog, NewPlayer, Player, PlayerChanges, PlayerId, User, UserId,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::DbError;
use crate::store::{CacheInvalidator, GameStore, InvalidationHook};

const GAME_COLUMNS: &str =
    "id, host_id, status, current_phase, current_round, winning_team, auto_sync_alive";
const PLAYER_COLUMNS: &str =
    "id, game_id, name, role, is_alive, public_is_alive, avatar, friend_id";
const LOG_COLUMNS: &str = "id, game_id, round, phase, message, timestamp";

/// How long a request waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend storing every collection in `PostgreSQL` tables.
pub struct PostgresStore {
    pool: PgPool,
    hook: InvalidationHook,
}

impl PostgresStore {
    /// Connect to `url` with at most `max_connections` pooled
    /// connections and bring the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for an unparseable URL,
    /// [`DbError::Postgres`] if the server is unreachable, or
    /// [`DbError::Migration`] if the schema cannot be applied.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(max_connections, "PostgreSQL store ready");
        Ok(Self {
            pool,
            hook: InvalidationHook::default(),
        })
    }

    async fn insert_log(
        tx: &mut Transaction<'_, Postgres>,
        game_id: GameId,
        log: &NewLog,
    ) -> Result<Option<LogRow>, DbError> {
        let row = sqlx::query_as::<_, LogRow>(&format!(
            r"INSERT INTO logs (game_id, round, phase, message, timestamp)
              SELECT $1, $2, $3, $4, $5
              WHERE EXISTS (SELECT 1 FROM games WHERE id = $1)
              RETURNING {LOG_COLUMNS}"
        ))
        .bind(game_id.into_inner())
        .bind(log.round)
        .bind(log.phase.as_str())
        .bind(&log.message)
        .bind(log.timestamp)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }
}

/// Map unique-constraint violations to [`DbError::Conflict`].
fn conflict_or(err: sqlx::Error, what: &str) -> DbError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DbError::Conflict(what.to_owned())
        }
        _ => DbError::Postgres(err),
    }
}

#[async_trait]
impl GameStore for PostgresStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"INSERT INTO users (username, password_hash)
              VALUES ($1, $2)
              RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, &format!("username {username} already exists")))?;
        Ok(row.into())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash FROM users WHERE id = $1",
        )
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn update_user_password(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"UPDATE users SET password_hash = $2 WHERE id = $1
              RETURNING id, username, password_hash",
        )
        .bind(user_id.into_inner())
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn list_friends(&self, user_id: UserId) -> Result<Vec<Friend>, DbError> {
        let rows = sqlx::query_as::<_, FriendRow>(
            r"SELECT id, user_id, name, description, image
              FROM friends
              WHERE user_id = $1
              ORDER BY LOWER(name), id",
        )
        .bind(user_id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Friend::from).collect())
    }

    async fn create_friend(&self, user_id: UserId, friend: NewFriend) -> Result<Friend, DbError> {
        let row = sqlx::query_as::<_, FriendRow>(
            r"INSERT INTO friends (user_id, name, description, image)
              VALUES ($1, $2, $3, $4)
              RETURNING id, user_id, name, description, image",
        )
        .bind(user_id.into_inner())
        .bind(&friend.name)
        .bind(&friend.description)
        .bind(&friend.image)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_friend_for_user(
        &self,
        friend_id: FriendId,
        user_id: UserId,
    ) -> Result<Option<Friend>, DbError> {
        let row = sqlx::query_as::<_, FriendRow>(
            r"SELECT id, user_id, name, description, image
              FROM friends
              WHERE id = $1 AND user_id = $2",
        )
        .bind(friend_id.into_inner())
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Friend::from))
    }

    async fn delete_friend(&self, friend_id: FriendId, user_id: UserId) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;
        // Seats keep their name and avatar; `ON DELETE SET NULL` detaches them.
        let touched: Vec<i64> = sqlx::query_scalar(
            r"SELECT DISTINCT p.game_id FROM players p
              JOIN friends f ON f.id = p.friend_id
              WHERE f.id = $1 AND f.user_id = $2",
        )
        .bind(friend_id.into_inner())
        .bind(user_id.into_inner())
        .fetch_all(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM friends WHERE id = $1 AND user_id = $2")
            .bind(friend_id.into_inner())
            .bind(user_id.into_inner())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        for game_id in touched {
            self.hook.notify(GameId::new(game_id));
        }
        Ok(result.rows_affected() > 0)
    }

    async fn create_game(&self, host_id: UserId, game: NewGame) -> Result<Game, DbError> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            r"INSERT INTO games (host_id, status, current_phase, current_round, auto_sync_alive)
              VALUES ($1, $2, $3, $4, $5)
              RETURNING {GAME_COLUMNS}"
        ))
        .bind(host_id.into_inner())
        .bind(game.status.as_str())
        .bind(game.current_phase.as_str())
        .bind(game.current_round)
        .bind(game.auto_sync_alive)
        .fetch_one(&self.pool)
        .await?;
        let game = Game::try_from(row)?;
        self.hook.notify(game.id);
        tracing::debug!(game_id = %game.id, %host_id, "Created game");
        Ok(game)
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<Game>, DbError> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE id = $1"
        ))
        .bind(game_id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Game::try_from).transpose()
    }

    async fn update_game(
        &self,
        game_id: GameId,
        changes: &GameChanges,
    ) -> Result<Option<Game>, DbError> {
        let mut tx = self.pool.begin().await?;
        let row = update_game_row(&mut tx, game_id, changes).await?;
        tx.commit().await?;
        let game = row.map(Game::try_from).transpose()?;
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
        let mut tx = self.pool.begin().await?;
        let Some(game_row) = update_game_row(&mut tx, game_id, changes).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        let Some(log_row) = Self::insert_log(&mut tx, game_id, &log).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        tx.commit().await?;

        let game = Game::try_from(game_row)?;
        let log = Log::try_from(log_row)?;
        self.hook.notify(game_id);
        Ok(Some((game, log)))
    }

    async fn list_games(
        &self,
        host_id: UserId,
        status: Option<GameStatus>,
    ) -> Result<Vec<Game>, DbError> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            r"SELECT {GAME_COLUMNS}
              FROM games
              WHERE host_id = $1 AND ($2::TEXT IS NULL OR status = $2)
              ORDER BY id DESC"
        ))
        .bind(host_id.into_inner())
        .bind(status.map(GameStatus::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Game::try_from).collect()
    }

    async fn add_player(&self, game_id: GameId, player: NewPlayer) -> Result<Player, DbError> {
        let row = sqlx::query_as::<_, PlayerRow>(&format!(
            r"INSERT INTO players (game_id, name, avatar, friend_id)
              SELECT $1, $2, $3, $4
              WHERE EXISTS (SELECT 1 FROM games WHERE id = $1)
              RETURNING {PLAYER_COLUMNS}"
        ))
        .bind(game_id.into_inner())
        .bind(&player.name)
        .bind(&player.avatar)
        .bind(player.friend_id.map(FriendId::into_inner))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::KeyNotFound(format!("game {game_id}")))?;
        self.hook.notify(game_id);
        Ok(row.into())
    }

    async fn update_player(
        &self,
        player_id: PlayerId,
        game_id: GameId,
        changes: &PlayerChanges,
    ) -> Result<Option<Player>, DbError> {
        let row = sqlx::query_as::<_, PlayerRow>(&format!(
            r"UPDATE players SET
                role = COALESCE($3, role),
                is_alive = COALESCE($4, is_alive),
                public_is_alive = COALESCE($5, public_is_alive)
              WHERE id = $1 AND game_id = $2
              RETURNING {PLAYER_COLUMNS}"
        ))
        .bind(player_id.into_inner())
        .bind(game_id.into_inner())
        .bind(&changes.role)
        .bind(changes.is_alive)
        .bind(changes.public_is_alive)
        .fetch_optional(&self.pool)
        .await?;
        if row.is_some() {
            self.hook.notify(game_id);
        }
        Ok(row.map(Player::from))
    }

    async fn get_player(
        &self,
        game_id: GameId,
        player_id: PlayerId,
    ) -> Result<Option<Player>, DbError> {
        let row = sqlx::query_as::<_, PlayerRow>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE id = $1 AND game_id = $2"
        ))
        .bind(player_id.into_inner())
        .bind(game_id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Player::from))
    }

    async fn list_players(&self, game_id: GameId) -> Result<Vec<Player>, DbError> {
        let rows = sqlx::query_as::<_, PlayerRow>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE game_id = $1 ORDER BY id"
        ))
        .bind(game_id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Player::from).collect())
    }

    async fn add_log(&self, game_id: GameId, log: NewLog) -> Result<Log, DbError> {
        let mut tx = self.pool.begin().await?;
        let row = Self::insert_log(&mut tx, game_id, &log)
            .await?
            .ok_or_else(|| DbError::KeyNotFound(format!("game {game_id}")))?;
        tx.commit().await?;
        self.hook.notify(game_id);
        Log::try_from(row)
    }

    async fn list_logs(&self, game_id: GameId) -> Result<Vec<Log>, DbError> {
        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE game_id = $1 ORDER BY timestamp, id"
        ))
        .bind(game_id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Log::try_from).collect()
    }

    fn set_cache_invalidator(&self, invalidator: Arc<dyn CacheInvalidator>) {
        self.hook.set(invalidator);
    }
}

async fn update_game_row(
    tx: &mut Transaction<'_, Postgres>,
    game_id: GameId,
    changes: &GameChanges,
) -> Result<Option<GameRow>, DbError> {
    let row = sqlx::query_as::<_, GameRow>(&format!(
        r"UPDATE games SET
            status = COALESCE($2, status),
            current_phase = COALESCE($3, current_phase),
            current_round = COALESCE($4, current_round),
            winning_team = COALESCE($5, winning_team)
          WHERE id = $1
          RETURNING {GAME_COLUMNS}"
    ))
    .bind(game_id.into_inner())
    .bind(changes.status.map(GameStatus::as_str))
    .bind(changes.current_phase.map(GamePhase::as_str))
    .bind(changes.current_round)
    .bind(&changes.winning_team)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
        }
    }
}

/// A row from the `friends` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FriendRow {
    id: i64,
    user_id: i64,
    name: String,
    description: Option<String>,
    image: Option<String>,
}

impl From<FriendRow> for Friend {
    fn from(row: FriendRow) -> Self {
        Self {
            id: FriendId::new(row.id),
            user_id: UserId::new(row.user_id),
            name: row.name,
            description: row.description,
            image: row.image,
        }
    }
}

/// A row from the `games` table. Status and phase are stored as text.
#[derive(Debug, Clone, sqlx::FromRow)]
struct GameRow {
    id: i64,
    host_id: i64,
    status: String,
    current_phase: String,
    current_round: i32,
    winning_team: Option<String>,
    auto_sync_alive: bool,
}

impl TryFrom<GameRow> for Game {
    type Error = DbError;

    fn try_from(row: GameRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: GameId::new(row.id),
            host_id: UserId::new(row.host_id),
            status: row.status.parse()?,
            current_phase: row.current_phase.parse()?,
            current_round: row.current_round,
            winning_team: row.winning_team,
            auto_sync_alive: row.auto_sync_alive,
        })
    }
}

/// A row from the `players` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PlayerRow {
    id: i64,
    game_id: i64,
    name: String,
    role: Option<String>,
    is_alive: bool,
    public_is_alive: bool,
    avatar: Option<String>,
    friend_id: Option<i64>,
}

impl From<PlayerRow> for Player {
    fn from(row: PlayerRow) -> Self {
        Self {
            id: PlayerId::new(row.id),
            game_id: GameId::new(row.game_id),
            name: row.name,
            role: row.role,
            is_alive: row.is_alive,
            public_is_alive: row.public_is_alive,
            avatar: row.avatar,
            friend_id: row.friend_id.map(FriendId::new),
        }
    }
}

/// A row from the `logs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct LogRow {
    id: i64,
    game_id: i64,
    round: i32,
    phase: String,
    message: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<LogRow> for Log {
    type Error = DbError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: LogId::new(row.id),
            game_id: GameId::new(row.game_id),
            round: row.round,
            phase: row.phase.parse()?,
            message: row.message,
            timestamp: row.timestamp,
        })
    }
}
