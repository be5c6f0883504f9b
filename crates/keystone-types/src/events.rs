//! Lifecycle notifications posted to the event/plugin layer.
//!
//! Events are fire-and-forget: the tick thread posts them and moves on.

use serde::{Deserialize, Serialize};

use crate::enums::EntityType;
use crate::ids::{ActorIndex, EntityId};
use crate::position::Position;

/// A notification emitted by the tick loop at a well-defined lifecycle point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEvent {
    /// An actor was admitted and now holds a registry slot.
    ActorActivated {
        /// The actor.
        entity: EntityId,
        /// Player or NPC.
        kind: EntityType,
        /// The slot it was assigned.
        index: ActorIndex,
        /// Where it entered the world.
        position: Position,
    },

    /// An actor left the world and released its registry slot.
    ActorDeactivated {
        /// The actor.
        entity: EntityId,
        /// Player or NPC.
        kind: EntityType,
        /// The slot it held.
        index: ActorIndex,
    },

    /// A player moved far enough that its client needs a new map region.
    RegionChanged {
        /// The player.
        entity: EntityId,
        /// The new region base.
        base: Position,
    },
}

impl WorldEvent {
    /// The entity this event concerns.
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::ActorActivated { entity, .. }
            | Self::ActorDeactivated { entity, .. }
            | Self::RegionChanged { entity, .. } => *entity,
        }
    }
}
