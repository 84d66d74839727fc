//! `Dragonfly` (Redis-compatible) connection and typed key operations.
//!
//! [`crate::DragonflyStore`] keeps every entity as a JSON document and
//! every one-to-many relation as a set of member IDs.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `user:{id}` | JSON | User document |
//! | `user:by_name:{username}` | String | Username index, claimed with `SET NX` |
//! | `user:{id}:friends` | Set | Friend IDs owned by the user |
//! | `user:{id}:games` | Set | Game IDs hosted by the user |
//! | `friend:{id}` | JSON | Friend document |
//! | `game:{id}` | JSON | Game header document |
//! | `game:{id}:players` | Set | Player IDs seated in the game |
//! | `game:{id}:logs` | Set | Log IDs of the game |
//! | `player:{id}` | JSON | Player document |
//! | `log:{id}` | JSON | Log document |
//! | `counter:{collection}` | Integer | ID block counter |

use fred::prelude::*;
use fred::types::SetOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and provides the JSON document,
/// set index and counter primitives the document store is built from.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // JSON documents
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize it from JSON.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    /// Read the raw JSON string at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.client.get(key).await?)
    }

    /// Read and deserialize many documents in one round-trip, skipping
    /// keys that no longer exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if any document fails to decode.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn mget_json<T: DeserializeOwned>(&self, keys: Vec<String>) -> Result<Vec<T>, DbError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = self.client.mget(keys).await?;
        values
            .into_iter()
            .flatten()
            .map(|s| serde_json::from_str(&s).map_err(DbError::from))
            .collect()
    }

    /// Store `value` at `key` only if the key does not already exist.
    ///
    /// Returns `true` if this call claimed the key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool, DbError> {
        let reply: Option<String> = self
            .client
            .set(key, value, None, Some(SetOptions::NX), false)
            .await?;
        Ok(reply.is_some())
    }

    /// Delete one or more keys.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, keys: Vec<String>) -> Result<(), DbError> {
        if keys.is_empty() {
            return Ok(());
        }
        let _: i64 = self.client.del(keys).await?;
        Ok(())
    }

    // =========================================================================
    // Set indexes
    // =========================================================================

    /// Add an ID to the set at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn add_member(&self, key: &str, id: i64) -> Result<(), DbError> {
        let _: i64 = self.client.sadd(key, id).await?;
        Ok(())
    }

    /// Remove an ID from the set at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn remove_member(&self, key: &str, id: i64) -> Result<(), DbError> {
        let _: i64 = self.client.srem(key, id).await?;
        Ok(())
    }

    /// All IDs in the set at `key`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if a member is not an integer.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn members(&self, key: &str) -> Result<Vec<i64>, DbError> {
        let raw: Vec<String> = self.client.smembers(key).await?;
        let mut ids = raw
            .iter()
            .map(|m| {
                m.parse::<i64>()
                    .map_err(|e| DbError::Corrupt(format!("{key} member {m:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    // =========================================================================
    // Counters and scripts
    // =========================================================================

    /// Atomically add `by` to the counter at `key` and return the new value.
    /// A missing counter starts at 0.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the increment fails.
    pub async fn incr_by(&self, key: &str, by: i64) -> Result<i64, DbError> {
        Ok(self.client.incr_by(key, by).await?)
    }

    /// Run a Lua script that returns an integer status code.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the script fails.
    pub async fn eval_status(
        &self,
        script: &str,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> Result<i64, DbError> {
        Ok(self.client.eval(script, keys, args).await?)
    }

    /// Remove every key in the current database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        tracing::warn!("Flushed all Dragonfly keys");
        Ok(())
    }
}
