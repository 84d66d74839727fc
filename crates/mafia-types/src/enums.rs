//! Enumeration types for game lifecycle state.
//!
//! Both enums serialize in lowercase (`"pending"`, `"day"`), which is also
//! the representation stored by every persistence backend.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A stored enum value that does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Lifecycle status of a game.
///
/// Status only ever moves forward: `Pending -> Active -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum GameStatus {
    /// Created, roles may be assigned, not yet started.
    Pending,
    /// Started; actions and phase changes are accepted.
    Active,
    /// Terminal; a winning team has been decided.
    Finished,
}

impl GameStatus {
    /// The lowercase wire/storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "finished" => Ok(Self::Finished),
            other => Err(ParseEnumError {
                kind: "game status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Day/night phase of an active game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum GamePhase {
    /// Discussion and voting.
    Day,
    /// Kills, saves and investigations.
    Night,
}

impl GamePhase {
    /// The lowercase wire/storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
        }
    }

    /// Capitalized name used in human-readable log messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Day => "Day",
            Self::Night => "Night",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GamePhase {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "night" => Ok(Self::Night),
            other => Err(ParseEnumError {
                kind: "game phase",
                value: other.to_owned(),
            }),
        }
    }
}
