//! HTTP and `WebSocket` server for MafiaDesk.
//!
//! This crate exposes the game session manager over:
//!
//! - **REST endpoints** under `/api/games` for the host console, one per
//!   lifecycle operation
//! - **`WebSocket` endpoint** (`/ws/game/{id}`) streaming a game's events
//!   to viewers via the [`mafia_core::BroadcastHub`]
//!
//! The caller is identified by the `x-user-id` header set by the
//! authenticating proxy in front of the server (see [`identity`]).

pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use backend::open_store;
pub use config::{ConfigError, MafiaConfig};
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
