//! Per-game fan-out of [`GameEventMessage`]s to live subscribers.
//!
//! Each game gets its own [`broadcast`] channel, created lazily on the
//! first subscribe or publish. Publishing is a synchronous `send` and
//! never fails the caller. A subscriber that falls behind by more than
//! [`BROADCAST_CAPACITY`] messages receives
//! [`broadcast::error::RecvError::Lagged`] and skips to the newest one.
//! Channels whose last receiver has gone are pruned on the next publish.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use mafia_types::{GameEventMessage, GameId};
use tokio::sync::broadcast;

/// Capacity of each per-game broadcast channel.
pub const BROADCAST_CAPACITY: usize = 256;

/// Registry of per-game broadcast channels.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<GameId, broadcast::Sender<GameEventMessage>>>,
}

impl BroadcastHub {
    /// Create a hub with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<GameId, broadcast::Sender<GameEventMessage>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to all future events of `game_id`.
    pub fn subscribe(&self, game_id: GameId) -> broadcast::Receiver<GameEventMessage> {
        self.channels()
            .entry(game_id)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Push `message` to every subscriber of `game_id`.
    ///
    /// Returns how many subscribers the message was queued for.
    pub fn publish(&self, game_id: GameId, message: GameEventMessage) -> usize {
        let mut channels = self.channels();
        channels.retain(|id, tx| *id == game_id || tx.receiver_count() > 0);

        let event = message.event.clone();
        let tx = channels
            .entry(game_id)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0);
        let delivered = tx.send(message).unwrap_or(0);
        if delivered == 0 {
            channels.remove(&game_id);
        }
        tracing::debug!(%game_id, event = %event, subscribers = delivered, "Broadcast game event");
        delivered
    }

    /// Number of games with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    /// Number of live subscribers of `game_id`.
    pub fn subscriber_count(&self, game_id: GameId) -> usize {
        self.channels()
            .get(&game_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
