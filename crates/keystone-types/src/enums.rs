//! Enumeration types shared across the engine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// The kind of an entity, used to partition spatial cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// A connected player.
    Player,
    /// A non-player character.
    Npc,
    /// A static world object (doors, trees, rocks).
    Object,
    /// An item lying on the ground.
    GroundItem,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [Self; 4] = [Self::Player, Self::Npc, Self::Object, Self::GroundItem];

    /// Whether entities of this type are actors driven by the tick loop.
    pub const fn is_actor(self) -> bool {
        matches!(self, Self::Player | Self::Npc)
    }
}

/// Lifecycle of an actor.
///
/// `New -> Active -> Inactive`. An actor is `Active` exactly while it holds
/// a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    /// Created but not yet admitted into the world.
    New,
    /// Holding a registry slot and processed every tick.
    Active,
    /// Departed; never re-admitted.
    Inactive,
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Lifecycle of a scheduled task. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Constructed but never scheduled.
    Idle,
    /// Scheduled and eligible to run.
    Running,
    /// Cancelled; purged on the next scheduler pass.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// A pending change that must be included in the next update block.
///
/// Flags are raised by game logic during the tick and cleared in post-sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UpdateFlag {
    /// Appearance (equipment, transform, name) changed.
    Appearance,
    /// Public chat message.
    Chat,
    /// Scripted forced movement.
    ForcedMovement,
    /// Overhead text.
    ForcedChat,
    /// Animation started.
    Animation,
    /// Spot graphic started.
    Graphic,
    /// Started facing another entity.
    FaceEntity,
    /// Started facing a position.
    FacePosition,
    /// Took a hit.
    Hit,
}

/// One of the eight compass directions a mob can step in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// +y
    North,
    /// +x, +y
    NorthEast,
    /// +x
    East,
    /// +x, -y
    SouthEast,
    /// -y
    South,
    /// -x, -y
    SouthWest,
    /// -x
    West,
    /// -x, +y
    NorthWest,
}

impl Direction {
    /// All directions, clockwise from north.
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::NorthEast,
        Self::East,
        Self::SouthEast,
        Self::South,
        Self::SouthWest,
        Self::West,
        Self::NorthWest,
    ];

    /// Unit step `(dx, dy)` for this direction.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, 1),
            Self::NorthEast => (1, 1),
            Self::East => (1, 0),
            Self::SouthEast => (1, -1),
            Self::South => (0, -1),
            Self::SouthWest => (-1, -1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, 1),
        }
    }

    /// Direction of a single-tile step, or `None` if `(dx, dy)` is not a
    /// unit step.
    pub const fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, 1) => Some(Self::North),
            (1, 1) => Some(Self::NorthEast),
            (1, 0) => Some(Self::East),
            (1, -1) => Some(Self::SouthEast),
            (0, -1) => Some(Self::South),
            (-1, -1) => Some(Self::SouthWest),
            (-1, 0) => Some(Self::West),
            (-1, 1) => Some(Self::NorthWest),
            _ => None,
        }
    }
}
