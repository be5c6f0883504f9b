//! Error types for the `keystone-world` crate.

use keystone_types::{EntityId, EntityType};

/// Errors that can occur during spatial index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The position is on a height plane that does not exist.
    #[error("plane {plane} is out of range (max {max})")]
    PlaneOutOfRange {
        /// The requested plane.
        plane: u8,
        /// Number of planes in the world.
        max: u8,
    },

    /// The entity has no cell under this type.
    #[error("entity {entity} of type {kind:?} is not registered")]
    NotRegistered {
        /// The entity.
        entity: EntityId,
        /// The type it was looked up under.
        kind: EntityType,
    },
}
