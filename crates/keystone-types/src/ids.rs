//! Identifier types.
//!
//! Entities carry a globally unique [`EntityId`] for their whole lifetime.
//! Actors that are active in the world additionally hold an [`ActorIndex`],
//! the dense slot number assigned by the registry and used by update
//! encoding to address them compactly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier for any entity placed in the world (players, NPCs,
    /// objects, ground items).
    EntityId
}

/// Dense registry slot of an active actor.
///
/// Slots are stable for as long as the actor stays active and are handed
/// out again only after the previous occupant has fully departed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorIndex(pub u16);

impl ActorIndex {
    /// Return the slot as a `usize` for indexing slot storage.
    pub fn slot(self) -> usize {
        usize::from(self.0)
    }

    /// Convert a slot position back into an index.
    ///
    /// Returns `None` if the slot does not fit in 16 bits.
    pub fn from_slot(slot: usize) -> Option<Self> {
        u16::try_from(slot).ok().map(Self)
    }
}

impl core::fmt::Display for ActorIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_unique() {
        assert_ne!(EntityId::new(), EntityId::new());
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = EntityId::new();
        let json = serde_json::to_string(&original).ok();
        assert!(json.is_some());
        let restored: Result<EntityId, _> = serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn actor_index_slot_conversion() {
        assert_eq!(ActorIndex::from_slot(17), Some(ActorIndex(17)));
        assert_eq!(ActorIndex(17).slot(), 17);
        assert_eq!(ActorIndex::from_slot(usize::from(u16::MAX) + 1), None);
    }

    #[test]
    fn actor_index_display() {
        assert_eq!(ActorIndex(3).to_string(), "#3");
    }
}
