//! Serialized views of a game aggregate.
//!
//! [`GameSnapshot`] is returned to the host after every operation and is
//! the body of every [`GameEventMessage`] pushed to live subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{GamePhase, GameStatus};
use crate::ids::{FriendId, GameId, LogId, PlayerId};
use crate::structs::{GameAggregate, Log, Player};

/// Which alive flag a snapshot exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliveView {
    /// The authoritative flag (host responses).
    Authoritative,
    /// The publicly displayed flag (broadcasts to viewers).
    Public,
}

/// Player as shown in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlayerView {
    /// Player ID.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Role name.
    pub role: Option<String>,
    /// Alive flag for the requested view.
    pub is_alive: bool,
    /// Avatar.
    pub avatar: Option<String>,
    /// Source friend.
    pub friend_id: Option<FriendId>,
}

impl PlayerView {
    fn from_player(player: &Player, view: AliveView) -> Self {
        let is_alive = match view {
            AliveView::Authoritative => player.is_alive,
            AliveView::Public => player.public_is_alive,
        };
        Self {
            id: player.id,
            name: player.name.clone(),
            role: player.role.clone(),
            is_alive,
            avatar: player.avatar.clone(),
            friend_id: player.friend_id,
        }
    }
}

/// Log entry as shown in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LogView {
    /// Log ID.
    pub id: LogId,
    /// Round.
    pub round: i32,
    /// Phase.
    pub phase: GamePhase,
    /// Message.
    pub message: String,
    /// Timestamp, serialized as RFC 3339.
    pub timestamp: DateTime<Utc>,
}

impl From<&Log> for LogView {
    fn from(log: &Log) -> Self {
        Self {
            id: log.id,
            round: log.round,
            phase: log.phase,
            message: log.message.clone(),
            timestamp: log.timestamp,
        }
    }
}

/// Full current state of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameSnapshot {
    /// Game ID.
    pub game_id: GameId,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Current phase.
    pub phase: GamePhase,
    /// Current round.
    pub round: i32,
    /// Winning team, once finished.
    pub winning_team: Option<String>,
    /// Alive-visibility policy of the game.
    pub auto_sync_alive: bool,
    /// Players ordered by ID.
    pub players: Vec<PlayerView>,
    /// Logs in chronological order.
    pub logs: Vec<LogView>,
}

impl GameSnapshot {
    /// Project an aggregate with the given alive view.
    pub fn from_aggregate(aggregate: &GameAggregate, view: AliveView) -> Self {
        Self {
            game_id: aggregate.game.id,
            status: aggregate.game.status,
            phase: aggregate.game.current_phase,
            round: aggregate.game.current_round,
            winning_team: aggregate.game.winning_team.clone(),
            auto_sync_alive: aggregate.game.auto_sync_alive,
            players: aggregate
                .players
                .iter()
                .map(|p| PlayerView::from_player(p, view))
                .collect(),
            logs: aggregate.logs.iter().map(LogView::from).collect(),
        }
    }
}

/// A snapshot pushed to live subscribers, tagged with the event that
/// produced it and optional event-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameEventMessage {
    /// Event name (`game_started`, `phase_changed`, ...).
    pub event: String,
    /// The state after the event.
    #[serde(flatten)]
    pub snapshot: GameSnapshot,
    /// Extra event payload merged into the top-level object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GameEventMessage {
    /// A message with no extra payload.
    pub fn new(event: impl Into<String>, snapshot: GameSnapshot) -> Self {
        Self {
            event: event.into(),
            snapshot,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an extra top-level field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_owned(), value);
        self
    }
}
