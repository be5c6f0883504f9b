//! A single 8x8 cell of the spatial index.
//!
//! A [`Chunk`] holds one entity set per [`EntityType`]. It knows nothing
//! about positions inside itself; the [`SpatialIndex`] decides which chunk
//! an entity belongs to.
//!
//! [`SpatialIndex`]: crate::SpatialIndex

use std::collections::{BTreeMap, BTreeSet};

use keystone_types::{ChunkPosition, EntityId, EntityType};

/// Empty set handed out for entity types a chunk has never held.
static EMPTY: BTreeSet<EntityId> = BTreeSet::new();

/// Entities located inside one chunk, partitioned by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// This chunk's coordinates.
    position: ChunkPosition,
    /// Entity sets keyed by type. Sets are created on first insert.
    entities: BTreeMap<EntityType, BTreeSet<EntityId>>,
}

impl Chunk {
    /// Create an empty chunk.
    pub const fn new(position: ChunkPosition) -> Self {
        Self {
            position,
            entities: BTreeMap::new(),
        }
    }

    /// This chunk's coordinates.
    pub const fn position(&self) -> ChunkPosition {
        self.position
    }

    /// Add an entity. Returns `false` if it was already present.
    pub fn add(&mut self, entity: EntityId, kind: EntityType) -> bool {
        self.entities.entry(kind).or_default().insert(entity)
    }

    /// Remove an entity. Returns `false` if it was not present.
    pub fn remove(&mut self, entity: EntityId, kind: EntityType) -> bool {
        self.entities
            .get_mut(&kind)
            .is_some_and(|set| set.remove(&entity))
    }

    /// Whether this chunk holds the entity under `kind`.
    pub fn contains(&self, entity: EntityId, kind: EntityType) -> bool {
        self.entities
            .get(&kind)
            .is_some_and(|set| set.contains(&entity))
    }

    /// All entities of `kind` in this chunk.
    pub fn get_all(&self, kind: EntityType) -> &BTreeSet<EntityId> {
        self.entities.get(&kind).unwrap_or(&EMPTY)
    }

    /// Total entities of every type.
    pub fn len(&self) -> usize {
        self.entities.values().map(BTreeSet::len).sum()
    }

    /// Whether the chunk holds no entities at all.
    pub fn is_empty(&self) -> bool {
        self.entities.values().all(BTreeSet::is_empty)
    }
}
