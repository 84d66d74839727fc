//! MafiaDesk server binary.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `mafia-config.yaml` (or `MAFIA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured storage backend
//! 4. Build the game service and serve HTTP until `Ctrl-C`

use std::sync::Arc;

use mafia_server::{AppState, MafiaConfig, open_store, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, storage or the listener fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = MafiaConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        host = config.server.host,
        port = config.server.port,
        backend = ?config.storage.backend,
        auto_sync_alive = config.game.auto_sync_alive,
        "mafia-server starting"
    );

    let store = open_store(&config.storage).await?;
    let state = Arc::new(AppState::new(store, config.game.auto_sync_alive));

    start_server(&config.server, state).await?;
    Ok(())
}
