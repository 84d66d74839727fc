//! Shared type definitions for MafiaDesk.
//!
//! This crate is the single source of truth for the entities, requests and
//! snapshots used across the workspace. Wire types flow downstream to
//! `TypeScript` via `ts-rs` for the host and viewer frontends.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for all entity identifiers
//! - [`enums`] -- Game status and phase
//! - [`structs`] -- Entities, creation inputs, partial updates, the aggregate
//! - [`actions`] -- Action wire request and the closed action enum
//! - [`requests`] -- Lifecycle request payloads
//! - [`snapshot`] -- Snapshot and broadcast message views

pub mod actions;
pub mod enums;
pub mod ids;
pub mod requests;
pub mod snapshot;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actions::{ActionKind, ActionParseError, ActionRequest, ActionTarget, GameAction, NightActionsRequest};
pub use enums::{GamePhase, GameStatus, ParseEnumError};
pub use ids::{FriendId, GameId, LogId, PlayerId, UserId};
pub use requests::{
    AssignRolesRequest, CreateGameRequest, FinishGameRequest, PhaseChangeRequest, PlayerSpec,
    RoleAssignment,
};
pub use snapshot::{AliveView, GameEventMessage, GameSnapshot, LogView, PlayerView};
pub use structs::{
    Friend, Game, GameAggregate, GameChanges, Log, NewFriend, NewGame, NewLog, NewPlayer, Player,
    PlayerChanges, User,
};
