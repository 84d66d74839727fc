//! Request payloads accepted from the host for game lifecycle operations.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::Validate;

use crate::enums::GamePhase;
use crate::ids::{FriendId, PlayerId};

/// One seat in a new game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlayerSpec {
    /// Display name; ignored in favor of the friend's name when
    /// `friend_id` is set. Blank names are skipped.
    pub name: String,
    /// Seat one of the caller's saved friends.
    #[serde(default)]
    pub friend_id: Option<FriendId>,
    /// Explicit avatar, overriding the friend's image.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Create a new pending game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CreateGameRequest {
    /// Plain player names; used only when `players` is empty.
    #[serde(default)]
    pub player_names: Vec<String>,
    /// Detailed seat specs.
    #[serde(default)]
    pub players: Vec<PlayerSpec>,
    /// Alive-visibility policy; the server default applies when absent.
    #[serde(default)]
    pub auto_sync_alive: Option<bool>,
}

impl CreateGameRequest {
    /// The effective seat list: `players`, or one spec per name.
    pub fn seat_specs(&self) -> Vec<PlayerSpec> {
        if self.players.is_empty() {
            self.player_names
                .iter()
                .map(|name| PlayerSpec {
                    name: name.clone(),
                    ..PlayerSpec::default()
                })
                .collect()
        } else {
            self.players.clone()
        }
    }
}

/// Role assignment for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RoleAssignment {
    /// The player.
    pub player_id: PlayerId,
    /// The role name.
    pub role: String,
}

/// Assign roles to a batch of players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AssignRolesRequest {
    /// Assignments applied in order.
    pub assignments: Vec<RoleAssignment>,
}

/// Switch the game to a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PhaseChangeRequest {
    /// Target phase.
    pub phase: GamePhase,
}

/// Manually finish a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FinishGameRequest {
    /// The declared winner.
    #[validate(length(min = 1, message = "winning_team must not be empty"))]
    pub winning_team: String,
}
