//! Shared value types for the Keystone tick engine.
//!
//! Every crate in the workspace speaks in these types: identifiers, world
//! coordinates, lifecycle enums, and the lifecycle events posted to the
//! plugin layer.
//!
//! # Modules
//!
//! - [`ids`] -- [`EntityId`] (UUID v7) and the dense registry slot [`ActorIndex`]
//! - [`enums`] -- Entity kinds, lifecycle states, update flags, directions
//! - [`position`] -- World [`Position`] and the 8x8 [`ChunkPosition`] grid
//! - [`events`] -- [`WorldEvent`] notifications for the event layer

pub mod enums;
pub mod events;
pub mod ids;
pub mod position;

// Re-export all public types at crate root for convenience.
pub use enums::{Direction, EntityState, EntityType, TaskState, UpdateFlag};
pub use events::WorldEvent;
pub use ids::{ActorIndex, EntityId};
pub use position::{CHUNK_SIZE, ChunkPosition, HEIGHT_LEVELS, Position};
