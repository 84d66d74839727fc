//! Gameplay actions: the wire request and the closed action enum.
//!
//! Hosts submit actions as [`ActionRequest`] (a free-form `action_type`
//! string plus optional target and note). The session manager only ever
//! sees [`GameAction`], so an unknown kind or a missing target is rejected
//! once, at conversion time.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::Validate;

use crate::ids::PlayerId;

/// Kinds of gameplay action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ActionKind {
    /// Day vote eliminating a living player.
    Vote,
    /// Night kill.
    Kill,
    /// Doctor save, restoring a player to life.
    Save,
    /// Detective investigation; reveals the target's role in the log.
    Investigate,
}

impl ActionKind {
    /// The lowercase wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vote => "vote",
            Self::Kill => "kill",
            Self::Save => "save",
            Self::Investigate => "investigate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vote" => Ok(Self::Vote),
            "kill" => Ok(Self::Kill),
            "save" => Ok(Self::Save),
            "investigate" => Ok(Self::Investigate),
            _ => Err(ActionParseError::Unsupported(s.to_owned())),
        }
    }
}

/// Why a wire action could not be turned into a [`GameAction`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    /// The `action_type` is not a known kind.
    #[error("Unsupported action type")]
    Unsupported(String),

    /// The action needs a target player and none was given.
    #[error("{0} requires a target")]
    MissingTarget(ActionKind),
}

/// A single action as submitted by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionRequest {
    /// Action kind name (`vote`, `kill`, `save`, `investigate`).
    pub action_type: String,
    /// The targeted player.
    #[serde(default)]
    pub target_player_id: Option<PlayerId>,
    /// Custom log message replacing the default one.
    #[serde(default)]
    pub note: Option<String>,
}

/// The player an action targets, plus an optional custom log note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTarget {
    /// Targeted player.
    pub player_id: PlayerId,
    /// Custom log message; never empty.
    pub note: Option<String>,
}

/// A validated gameplay action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameAction {
    /// Vote a living player out.
    Vote(ActionTarget),
    /// Kill a player during the night.
    Kill(ActionTarget),
    /// Save a player.
    Save(ActionTarget),
    /// Investigate a player's role.
    Investigate(ActionTarget),
}

impl GameAction {
    /// The action's kind.
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Vote(_) => ActionKind::Vote,
            Self::Kill(_) => ActionKind::Kill,
            Self::Save(_) => ActionKind::Save,
            Self::Investigate(_) => ActionKind::Investigate,
        }
    }

    /// The action's target.
    pub const fn target(&self) -> &ActionTarget {
        match self {
            Self::Vote(t) | Self::Kill(t) | Self::Save(t) | Self::Investigate(t) => t,
        }
    }
}

impl TryFrom<&ActionRequest> for GameAction {
    type Error = ActionParseError;

    fn try_from(request: &ActionRequest) -> Result<Self, Self::Error> {
        let kind: ActionKind = request.action_type.parse()?;
        let player_id = request
            .target_player_id
            .ok_or(ActionParseError::MissingTarget(kind))?;
        let target = ActionTarget {
            player_id,
            note: request.note.clone().filter(|n| !n.is_empty()),
        };
        Ok(match kind {
            ActionKind::Vote => Self::Vote(target),
            ActionKind::Kill => Self::Kill(target),
            ActionKind::Save => Self::Save(target),
            ActionKind::Investigate => Self::Investigate(target),
        })
    }
}

/// A batch of night actions resolved in submission order.
///
/// Only `kill`, `save` and `investigate` are accepted in batch form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NightActionsRequest {
    /// The actions, in the order they should be applied.
    #[validate(length(min = 1, message = "at least one night action is required"))]
    pub actions: Vec<ActionRequest>,
}
