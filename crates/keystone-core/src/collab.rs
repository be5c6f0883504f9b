//! Collaborators the world talks to but does not own.
//!
//! The wire codec, account storage and event consumers live outside the
//! tick engine. The world reaches them only through the traits here, bundled
//! into a [`WorldContext`]:
//!
//! - [`Connection`] -- per-player outbound buffer, flush, and inbound input.
//! - [`Persistence`] -- account load at admission; saves go over a
//!   [`SaveQueue`] channel instead of a call.
//! - [`EventSink`] -- lifecycle events.
//! - [`UpdateEncoder`] -- turns a player's view into an outbound payload.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keystone_types::{ActorIndex, EntityId, Position, WorldEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actor::{Actor, Mob};
use crate::sync::PlayerView;

/// Errors raised by a [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The peer is gone.
    #[error("connection {index} is closed")]
    Closed {
        /// Player slot.
        index: ActorIndex,
    },

    /// Writing to the peer failed.
    #[error("connection {index} i/o failure: {reason}")]
    Io {
        /// Player slot.
        index: ActorIndex,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised by an [`UpdateEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The view could not be serialized.
    #[error("failed to encode update for {index}: {reason}")]
    Serialize {
        /// Player slot.
        index: ActorIndex,
        /// Description of the failure.
        reason: String,
    },
}

/// Per-player network endpoint.
///
/// Called from the tick thread in pre-sync and from worker threads during
/// the parallel update, one player per call.
pub trait Connection: Send + Sync {
    /// Append an encoded payload to the player's outbound buffer.
    fn enqueue_outbound(&self, index: ActorIndex, payload: Vec<u8>) -> Result<(), ConnectionError>;

    /// Push everything buffered for the player to the wire.
    fn flush(&self, index: ActorIndex) -> Result<(), ConnectionError>;

    /// Apply buffered inbound input (walk requests, chat) to the player.
    fn on_inbound_ready(&self, player: &mut Mob) -> Result<(), ConnectionError>;

    /// Close the player's connection after a forced departure.
    fn disconnect(&self, index: ActorIndex);
}

/// Result of loading a player at admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Saved state was applied to the player.
    Loaded,
    /// No saved state; the player starts fresh.
    NewAccount,
    /// Credentials did not match.
    InvalidCredentials,
    /// Storage failed.
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl LoadOutcome {
    /// Whether the player may enter the world.
    pub const fn admits(&self) -> bool {
        matches!(self, Self::Loaded | Self::NewAccount)
    }
}

/// Account storage.
pub trait Persistence: Send + Sync {
    /// Load saved state into a player about to be admitted.
    fn load(&self, player: &mut Mob) -> LoadOutcome;
}

/// Consumer of world lifecycle events. Must not block.
pub trait EventSink: Send + Sync {
    /// Publish an event.
    fn post(&self, event: WorldEvent);
}

/// Serializes a player's view for the wire.
pub trait UpdateEncoder: Send + Sync {
    /// Encode `player`'s view of the world this tick.
    fn encode(&self, player: &Mob, view: &PlayerView<'_>) -> Result<Vec<u8>, EncodeError>;
}

/// A save handed off when a player leaves the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// The departing player.
    pub entity: EntityId,
    /// Account name.
    pub username: String,
    /// Where the player left the world.
    pub position: Position,
    /// When the save was requested.
    pub requested_at: DateTime<Utc>,
}

impl SaveRequest {
    /// Build a save request for a departing player, or `None` for NPCs.
    pub fn for_player(player: &Mob) -> Option<Self> {
        Some(Self {
            entity: player.id(),
            username: player.username()?.to_owned(),
            position: player.position(),
            requested_at: Utc::now(),
        })
    }
}

/// Sending half of the save channel.
///
/// The world's obligation ends when the request is accepted by the channel;
/// a full or closed channel is logged and the request dropped.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    sender: mpsc::Sender<SaveRequest>,
}

impl SaveQueue {
    /// Create a bounded save channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SaveRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Hand a save off. Returns whether the channel accepted it.
    pub fn hand_off(&self, request: SaveRequest) -> bool {
        match self.sender.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(entity = %request.entity, username = %request.username, "save queue full, save dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!(entity = %request.entity, username = %request.username, "save queue closed, save dropped");
                false
            }
        }
    }
}

/// Connection that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConnection;

impl Connection for NullConnection {
    fn enqueue_outbound(&self, _index: ActorIndex, _payload: Vec<u8>) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn flush(&self, _index: ActorIndex) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn on_inbound_ready(&self, _player: &mut Mob) -> Result<(), ConnectionError> {
        Ok(())
    }

    fn disconnect(&self, index: ActorIndex) {
        debug!(%index, "Null connection disconnect");
    }
}

/// Persistence that treats every login as a new account.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllPersistence;

impl Persistence for AcceptAllPersistence {
    fn load(&self, _player: &mut Mob) -> LoadOutcome {
        LoadOutcome::NewAccount
    }
}

/// Event sink that logs every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn post(&self, event: WorldEvent) {
        info!(entity = %event.entity(), ?event, "World event");
    }
}

/// Encoder that emits an empty payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEncoder;

impl UpdateEncoder for EmptyEncoder {
    fn encode(&self, _player: &Mob, _view: &PlayerView<'_>) -> Result<Vec<u8>, EncodeError> {
        Ok(Vec::new())
    }
}

/// Every collaborator the world uses.
#[derive(Clone)]
pub struct WorldContext {
    /// Player network endpoints.
    pub connection: Arc<dyn Connection>,
    /// Account storage.
    pub persistence: Arc<dyn Persistence>,
    /// Lifecycle event consumer.
    pub events: Arc<dyn EventSink>,
    /// Per-player view encoder.
    pub encoder: Arc<dyn UpdateEncoder>,
    /// Save handoff channel.
    pub saves: SaveQueue,
}

impl WorldContext {
    /// Context with the do-nothing collaborators and a new save channel.
    pub fn detached(save_capacity: usize) -> (Self, mpsc::Receiver<SaveRequest>) {
        let (saves, receiver) = SaveQueue::channel(save_capacity);
        let context = Self {
            connection: Arc::new(NullConnection),
            persistence: Arc::new(AcceptAllPersistence),
            events: Arc::new(LogEventSink),
            encoder: Arc::new(EmptyEncoder),
            saves,
        };
        (context, receiver)
    }
}

impl std::fmt::Debug for WorldContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldContext")
            .field("saves", &self.saves)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actor::Credentials;

    fn player() -> Mob {
        Mob::player(Credentials::new("carol", "pw"), Position::new(3200, 3200, 0))
    }

    #[test]
    fn save_request_only_for_players() {
        let request = SaveRequest::for_player(&player()).unwrap();
        assert_eq!(request.username, "carol");
        assert_eq!(request.position, Position::new(3200, 3200, 0));
        assert!(SaveRequest::for_player(&Mob::npc(1, Position::new(0, 0, 0))).is_none());
    }

    #[test]
    fn hand_off_respects_capacity() {
        let (queue, mut receiver) = SaveQueue::channel(1);
        let request = SaveRequest::for_player(&player()).unwrap();
        assert!(queue.hand_off(request.clone()));
        assert!(!queue.hand_off(request.clone()));
        assert_eq!(receiver.try_recv().unwrap(), request);
    }

    #[test]
    fn hand_off_to_closed_channel_is_dropped() {
        let (queue, receiver) = SaveQueue::channel(4);
        drop(receiver);
        assert!(!queue.hand_off(SaveRequest::for_player(&player()).unwrap()));
    }

    #[test]
    fn load_outcomes() {
        assert!(LoadOutcome::Loaded.admits());
        assert!(LoadOutcome::NewAccount.admits());
        assert!(!LoadOutcome::InvalidCredentials.admits());
        assert!(
            !LoadOutcome::Failed {
                reason: String::from("db down")
            }
            .admits()
        );
    }
}
