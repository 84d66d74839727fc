//! Read-through cache of game bundles.
//!
//! [`BundleCache`] sits in front of [`GameStore::get_game_bundle`] and
//! registers itself as the store's invalidation listener, so any write
//! touching a game evicts its entry. Each game carries a generation
//! counter bumped on invalidation; a fill that started before an
//! invalidation is not stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use mafia_types::{GameAggregate, GameId};

use crate::error::DbError;
use crate::store::GameStore;

#[derive(Default)]
struct CacheState {
    entries: HashMap<GameId, GameAggregate>,
    generations: HashMap<GameId, u64>,
}

impl CacheState {
    fn generation(&self, game_id: GameId) -> u64 {
        self.generations.get(&game_id).copied().unwrap_or(0)
    }
}

/// Per-game cache of [`GameAggregate`]s, invalidated by store writes.
pub struct BundleCache {
    store: Arc<dyn GameStore>,
    state: Mutex<CacheState>,
}

impl BundleCache {
    /// Create a cache over `store` and install it as the store's
    /// invalidation listener.
    pub fn attach(store: Arc<dyn GameStore>) -> Arc<Self> {
        let cache = Arc::new(Self {
            store: Arc::clone(&store),
            state: Mutex::new(CacheState::default()),
        });
        let weak: Weak<Self> = Arc::downgrade(&cache);
        store.set_cache_invalidator(Arc::new(move |game_id: GameId| -> anyhow::Result<()> {
            if let Some(cache) = weak.upgrade() {
                cache.invalidate(game_id);
            }
            Ok(())
        }));
        cache
    }

    /// The store this cache reads through.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a game bundle, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the underlying read fails.
    pub async fn get(&self, game_id: GameId) -> Result<Option<GameAggregate>, DbError> {
        let generation = {
            let state = self.lock();
            if let Some(bundle) = state.entries.get(&game_id) {
                tracing::trace!(%game_id, "Bundle cache hit");
                return Ok(Some(bundle.clone()));
            }
            state.generation(game_id)
        };

        let bundle = self.store.get_game_bundle(game_id).await?;
        if let Some(bundle) = &bundle {
            let mut state = self.lock();
            if state.generation(game_id) == generation {
                state.entries.insert(game_id, bundle.clone());
            } else {
                tracing::debug!(%game_id, "Discarding bundle filled before invalidation");
            }
        }
        Ok(bundle)
    }

    /// Drop the cached bundle for `game_id`.
    pub fn invalidate(&self, game_id: GameId) {
        let mut state = self.lock();
        state.entries.remove(&game_id);
        let next = state.generation(game_id).wrapping_add(1);
        state.generations.insert(game_id, next);
    }

    /// Whether a bundle for `game_id` is currently cached.
    pub fn is_cached(&self, game_id: GameId) -> bool {
        self.lock().entries.contains_key(&game_id)
    }
}
