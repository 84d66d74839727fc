//! Game rules and session management for MafiaDesk.
//!
//! The host drives a game through a [`GameSession`]: every operation is
//! validated against the lifecycle, persisted through the shared
//! [`mafia_db::GameStore`], applied to memory, and pushed to live viewers
//! through the [`BroadcastHub`].
//!
//! # Modules
//!
//! - [`service`] -- Game creation, listing and read access
//! - [`registry`] -- One live session per game
//! - [`session`] -- Lifecycle operations on one game
//! - [`rules`] -- Win conditions and special roles
//! - [`broadcast`] -- Per-game fan-out to live subscribers
//! - [`error`] -- Operation errors and their classification

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod rules;
pub mod service;
pub mod session;

pub use broadcast::{BROADCAST_CAPACITY, BroadcastHub};
pub use error::{ErrorKind, GameError};
pub use registry::SessionRegistry;
pub use rules::determine_winner;
pub use service::{ANIMAL_AVATARS, GameService, random_animal_avatar};
pub use session::{GameSession, events};
