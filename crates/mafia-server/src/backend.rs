//! Persistence backend selection.

use std::sync::Arc;

use mafia_db::{DbError, DragonflyPool, DragonflyStore, GameStore, MemoryStore, PostgresStore};
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};

/// Open the configured store.
///
/// `PostgreSQL` migrations run before the store is handed out.
///
/// # Errors
///
/// Returns [`DbError`] if the backend cannot be reached or migrated, or
/// if the ID block size is not positive.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn GameStore>, DbError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage; games are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let store =
                PostgresStore::connect(&config.postgres_url, config.max_connections).await?;
            info!("Using PostgreSQL storage");
            Ok(Arc::new(store))
        }
        StorageBackend::Dragonfly => {
            let pool = DragonflyPool::connect(&config.dragonfly_url).await?;
            let store = DragonflyStore::new(pool, config.id_block_size)?;
            info!(id_block_size = config.id_block_size, "Using Dragonfly storage");
            Ok(Arc::new(store))
        }
    }
}
