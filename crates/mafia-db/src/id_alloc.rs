//! Block-based integer ID allocation for the document store.
//!
//! Each collection keeps one cached range of IDs per process. When the
//! range runs out, the allocator reserves a fresh block of `block_size`
//! IDs from a shared [`BlockSource`] (for `Dragonfly`, one `INCRBY` on
//! `counter:{collection}`). Blocks are never handed out twice, so IDs stay
//! unique across processes and restarts; unused tail IDs are simply
//! skipped.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;

/// Default number of IDs reserved per block.
pub const DEFAULT_BLOCK_SIZE: i64 = 20;

/// The persisted collections that need IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// `users`
    Users,
    /// `friends`
    Friends,
    /// `games`
    Games,
    /// `players`
    Players,
    /// `logs`
    Logs,
}

impl Collection {
    /// Collection name as used in counter keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Friends => "friends",
            Self::Games => "games",
            Self::Players => "players",
            Self::Logs => "logs",
        }
    }

    /// The `counter:{collection}` key.
    pub fn counter_key(self) -> String {
        format!("counter:{}", self.as_str())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared counter that reserves ID blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Atomically add `size` to the collection's counter and return the
    /// new value, which is the last ID of the reserved block.
    async fn reserve(&self, collection: Collection, size: i64) -> Result<i64, DbError>;
}

#[async_trait]
impl BlockSource for DragonflyPool {
    async fn reserve(&self, collection: Collection, size: i64) -> Result<i64, DbError> {
        self.incr_by(&collection.counter_key(), size).await
    }
}

/// Process-local [`BlockSource`], for tests and single-process runs.
#[derive(Debug, Default)]
pub struct LocalBlockSource {
    counters: Mutex<HashMap<Collection, i64>>,
}

#[async_trait]
impl BlockSource for LocalBlockSource {
    async fn reserve(&self, collection: Collection, size: i64) -> Result<i64, DbError> {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(collection).or_insert(0);
        *counter = counter
            .checked_add(size)
            .ok_or_else(|| DbError::Corrupt(format!("counter:{collection} overflow")))?;
        Ok(*counter)
    }
}

/// The unused part of a reserved block: `next..=last`.
#[derive(Debug, Clone, Copy)]
struct Block {
    next: i64,
    last: i64,
}

/// Hands out strictly increasing IDs per collection from reserved blocks.
pub struct IdAllocator<S> {
    source: S,
    block_size: i64,
    blocks: Mutex<HashMap<Collection, Block>>,
}

impl<S: BlockSource> IdAllocator<S> {
    /// Create an allocator reserving `block_size` IDs at a time.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if `block_size` is not positive.
    pub fn new(source: S, block_size: i64) -> Result<Self, DbError> {
        if block_size <= 0 {
            return Err(DbError::Config(format!(
                "ID block size must be positive, got {block_size}"
            )));
        }
        Ok(Self {
            source,
            block_size,
            blocks: Mutex::new(HashMap::new()),
        })
    }

    /// The configured block size.
    pub const fn block_size(&self) -> i64 {
        self.block_size
    }

    /// Mint the next ID for `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if reserving a new block fails.
    pub async fn next_id(&self, collection: Collection) -> Result<i64, DbError> {
        let mut blocks = self.blocks.lock().await;
        if let Some(block) = blocks.get_mut(&collection) {
            if block.next <= block.last {
                let id = block.next;
                block.next = id.saturating_add(1);
                return Ok(id);
            }
        }

        let last = self.source.reserve(collection, self.block_size).await?;
        let first = last
            .checked_sub(self.block_size)
            .and_then(|v| v.checked_add(1))
            .ok_or_else(|| DbError::Corrupt(format!("counter:{collection} out of range")))?;
        tracing::debug!(%collection, first, last, "Reserved ID block");
        blocks.insert(
            collection,
            Block {
                next: first.saturating_add(1),
                last,
            },
        );
        Ok(first)
    }
}
