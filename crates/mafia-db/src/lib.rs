//! Persistence layer for MafiaDesk.
//!
//! Every backend implements the same [`GameStore`] contract and is shared
//! as `Arc<dyn GameStore>`; callers never know which one they talk to.
//!
//! ```text
//!                 Arc<dyn GameStore>
//!                         |
//!       +-----------------+------------------+
//!       |                 |                  |
//!  MemoryStore      PostgresStore      DragonflyStore
//!  (one Mutex)      (sqlx PgPool)      (DragonflyPool + IdAllocator)
//! ```
//!
//! [`BundleCache`] reads game bundles through any backend and is evicted
//! by the backend's invalidation hook.
//!
//! # Modules
//!
//! - [`store`] -- The `GameStore` contract and the invalidation hook
//! - [`memory`] -- In-process backend
//! - [`postgres_store`] -- Relational backend and its migrations
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) key operations
//! - [`document_store`] -- Document backend
//! - [`id_alloc`] -- Block-based ID allocation for the document backend
//! - [`cache`] -- Read-through bundle cache
//! - [`error`] -- Shared error types

pub mod cache;
pub mod document_store;
pub mod dragonfly;
pub mod error;
pub mod id_alloc;
pub mod memory;
pub mod postgres_store;
pub mod store;

// Re-export primary types for convenience.
pub use cache::BundleCache;
pub use document_store::DragonflyStore;
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use id_alloc::{BlockSource, Collection, DEFAULT_BLOCK_SIZE, IdAllocator, LocalBlockSource};
pub use memory::MemoryStore;
pub use postgres_store::PostgresStore;
pub use store::{CacheInvalidator, GameStore, InvalidationHook};
