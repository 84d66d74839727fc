//! Core entity structs and their creation/update inputs.
//!
//! Entities mirror the five persisted collections (users, friends, games,
//! players, logs). [`GameAggregate`] is the in-memory composite of one
//! game that the session manager mutates and broadcasts; it is never
//! persisted as a unit.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{GamePhase, GameStatus};
use crate::ids::{FriendId, GameId, LogId, PlayerId, UserId};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A registered user. Users host games and own friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Password hash produced by the (external) auth layer.
    pub password_hash: String,
}

/// A saved friend that can be seated in new games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Friend {
    /// Unique friend ID.
    pub id: FriendId,
    /// The user this friend belongs to.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Optional avatar image reference.
    pub image: Option<String>,
}

/// Persisted game header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Game {
    /// Unique game ID.
    pub id: GameId,
    /// The hosting user. Only the host may mutate the game.
    pub host_id: UserId,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current day/night phase.
    pub current_phase: GamePhase,
    /// Current round, starting at 1.
    pub current_round: i32,
    /// Winning team once the game is finished.
    pub winning_team: Option<String>,
    /// When true, kills/votes/saves update the public alive flag
    /// immediately; when false the public flag lags until a night sync.
    pub auto_sync_alive: bool,
}

impl Game {
    /// Apply a partial update in place.
    pub fn apply(&mut self, changes: &GameChanges) {
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(phase) = changes.current_phase {
            self.current_phase = phase;
        }
        if let Some(round) = changes.current_round {
            self.current_round = round;
        }
        if let Some(team) = &changes.winning_team {
            self.winning_team = Some(team.clone());
        }
    }
}

/// A player seated in a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Player {
    /// Unique player ID.
    pub id: PlayerId,
    /// The game this player belongs to.
    pub game_id: GameId,
    /// Display name.
    pub name: String,
    /// Assigned role name (free text; "Mafia" and "Jester" are special).
    pub role: Option<String>,
    /// Authoritative alive flag, used for win-condition math.
    pub is_alive: bool,
    /// Publicly displayed alive flag.
    pub public_is_alive: bool,
    /// Avatar (emoji or image reference).
    pub avatar: Option<String>,
    /// The friend this player was seated from, if any.
    pub friend_id: Option<FriendId>,
}

impl Player {
    /// Apply a partial update in place.
    pub fn apply(&mut self, changes: &PlayerChanges) {
        if let Some(role) = &changes.role {
            self.role = Some(role.clone());
        }
        if let Some(alive) = changes.is_alive {
            self.is_alive = alive;
        }
        if let Some(public) = changes.public_is_alive {
            self.public_is_alive = public;
        }
    }
}

/// An append-only game log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Log {
    /// Unique log ID.
    pub id: LogId,
    /// The game this entry belongs to.
    pub game_id: GameId,
    /// Round at time of writing.
    pub round: i32,
    /// Phase at time of writing.
    pub phase: GamePhase,
    /// Free-text message.
    pub message: String,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Creation inputs
// ---------------------------------------------------------------------------

/// Initial state for a new game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    /// Initial status.
    pub status: GameStatus,
    /// Initial phase.
    pub current_phase: GamePhase,
    /// Initial round.
    pub current_round: i32,
    /// Alive-visibility policy.
    pub auto_sync_alive: bool,
}

impl NewGame {
    /// Default game settings with the given visibility policy.
    pub const fn with_auto_sync(auto_sync_alive: bool) -> Self {
        Self {
            status: GameStatus::Pending,
            current_phase: GamePhase::Day,
            current_round: 1,
            auto_sync_alive,
        }
    }

    /// Build the persisted header once an ID has been assigned.
    pub fn into_game(self, id: GameId, host_id: UserId) -> Game {
        Game {
            id,
            host_id,
            status: self.status,
            current_phase: self.current_phase,
            current_round: self.current_round,
            winning_team: None,
            auto_sync_alive: self.auto_sync_alive,
        }
    }
}

impl Default for NewGame {
    fn default() -> Self {
        Self::with_auto_sync(true)
    }
}

/// Input for creating a friend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewFriend {
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional avatar image reference.
    pub image: Option<String>,
}

/// Input for seating a player. New players start alive with no role.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewPlayer {
    /// Display name.
    pub name: String,
    /// Avatar.
    pub avatar: Option<String>,
    /// Source friend.
    pub friend_id: Option<FriendId>,
}

impl NewPlayer {
    /// Build the persisted player once an ID has been assigned.
    pub fn into_player(self, id: PlayerId, game_id: GameId) -> Player {
        Player {
            id,
            game_id,
            name: self.name,
            role: None,
            is_alive: true,
            public_is_alive: true,
            avatar: self.avatar,
            friend_id: self.friend_id,
        }
    }
}

/// Input for appending a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLog {
    /// Round at time of writing.
    pub round: i32,
    /// Phase at time of writing.
    pub phase: GamePhase,
    /// Message text.
    pub message: String,
    /// Entry timestamp.
    pub timestamp: DateTime<Utc>,
}

impl NewLog {
    /// A log entry stamped with the current time.
    ///
    /// Timestamps are truncated to microseconds, the precision every
    /// backend can store losslessly.
    pub fn now(round: i32, phase: GamePhase, message: impl Into<String>) -> Self {
        Self {
            round,
            phase,
            message: message.into(),
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }

    /// Build the persisted entry once an ID has been assigned.
    pub fn into_log(self, id: LogId, game_id: GameId) -> Log {
        Log {
            id,
            game_id,
            round: self.round,
            phase: self.phase,
            message: self.message,
            timestamp: self.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// Partial update of a game header. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameChanges {
    /// New status.
    pub status: Option<GameStatus>,
    /// New phase.
    pub current_phase: Option<GamePhase>,
    /// New round.
    pub current_round: Option<i32>,
    /// Winning team.
    pub winning_team: Option<String>,
}

impl GameChanges {
    /// Changes that finish the game with the given winner.
    pub fn finish(team: impl Into<String>) -> Self {
        Self {
            status: Some(GameStatus::Finished),
            winning_team: Some(team.into()),
            ..Self::default()
        }
    }
}

/// Partial update of a player. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerChanges {
    /// New role.
    pub role: Option<String>,
    /// New authoritative alive flag.
    pub is_alive: Option<bool>,
    /// New public alive flag.
    pub public_is_alive: Option<bool>,
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// One game's complete state: header, players by ID, logs by
/// `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAggregate {
    /// The game header.
    pub game: Game,
    /// Players ordered by ID.
    pub players: Vec<Player>,
    /// Logs ordered by `(timestamp, id)`.
    pub logs: Vec<Log>,
}

impl GameAggregate {
    /// Assemble an aggregate, normalizing player and log ordering.
    pub fn new(game: Game, mut players: Vec<Player>, mut logs: Vec<Log>) -> Self {
        players.sort_by_key(|p| p.id);
        logs.sort_by_key(|l| (l.timestamp, l.id));
        Self {
            game,
            players,
            logs,
        }
    }

    /// The game ID.
    pub const fn id(&self) -> GameId {
        self.game.id
    }

    /// The hosting user.
    pub const fn host_id(&self) -> UserId {
        self.game.host_id
    }

    /// Look up a player of this game.
    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    /// Replace a stored player with its updated version.
    ///
    /// Players not already in the aggregate are inserted in ID order.
    pub fn upsert_player(&mut self, player: Player) {
        match self.players.binary_search_by_key(&player.id, |p| p.id) {
            Ok(pos) => {
                if let Some(slot) = self.players.get_mut(pos) {
                    *slot = player;
                }
            }
            Err(pos) => self.players.insert(pos, player),
        }
    }

    /// Insert a log entry keeping `(timestamp, id)` order.
    pub fn push_log(&mut self, log: Log) {
        let key = (log.timestamp, log.id);
        let pos = self.logs.partition_point(|l| (l.timestamp, l.id) <= key);
        self.logs.insert(pos, log);
    }
}
