//! The spatial index: lazily created chunks keyed by [`ChunkPosition`].
//!
//! Every query is scoped to one chunk (or the handful of chunks around a
//! position), so the cost of visibility and update-scope computation grows
//! with local density instead of world size.
//!
//! The index also records which chunk each entity is registered in. That
//! reverse map is what enforces the core invariant: an entity is present in
//! at most one chunk per type, and a move across a chunk boundary is a single
//! call that removes from the old chunk and adds to the new one.

use std::collections::{BTreeMap, BTreeSet};

use keystone_types::{ChunkPosition, EntityId, EntityType, HEIGHT_LEVELS, Position};
use tracing::trace;

use crate::chunk::Chunk;
use crate::error::WorldError;

/// Empty set returned for chunks that were never touched.
static EMPTY: BTreeSet<EntityId> = BTreeSet::new();

/// The result of moving an entity whose new position is in another chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellChange {
    /// The chunk it left, `None` if it was not registered before.
    pub from: Option<ChunkPosition>,
    /// The chunk it is registered in now.
    pub to: ChunkPosition,
}

/// Entities per chunk per type.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    /// Chunks created so far. A chunk is created on first registration and
    /// kept afterwards.
    chunks: BTreeMap<ChunkPosition, Chunk>,
    /// Reverse map: the chunk each (entity, type) pair is registered in.
    membership: BTreeMap<(EntityId, EntityType), ChunkPosition>,
}

impl SpatialIndex {
    /// Create an empty index.
    pub const fn new() -> Self {
        Self {
            chunks: BTreeMap::new(),
            membership: BTreeMap::new(),
        }
    }

    /// The chunk containing `position`.
    pub const fn cell_for(position: Position) -> ChunkPosition {
        position.chunk()
    }

    // -------------------------------------------------------------------
    // Mutation (tick thread only)
    // -------------------------------------------------------------------

    /// Register `entity` as `kind` in the chunk containing `position`.
    ///
    /// Returns the chunk change if membership changed, `None` if the entity
    /// was already registered in that chunk. An entity registered in a
    /// different chunk is moved: removed from the old chunk and added to
    /// the new one in the same call.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::PlaneOutOfRange`] if the position's plane does
    /// not exist.
    pub fn register_at(
        &mut self,
        entity: EntityId,
        kind: EntityType,
        position: Position,
    ) -> Result<Option<CellChange>, WorldError> {
        if position.plane >= HEIGHT_LEVELS {
            return Err(WorldError::PlaneOutOfRange {
                plane: position.plane,
                max: HEIGHT_LEVELS,
            });
        }

        let to = Self::cell_for(position);
        let from = self.membership.get(&(entity, kind)).copied();
        if from == Some(to) {
            return Ok(None);
        }

        if let Some(old) = from
            && let Some(chunk) = self.chunks.get_mut(&old)
        {
            chunk.remove(entity, kind);
        }
        self.chunks
            .entry(to)
            .or_insert_with(|| Chunk::new(to))
            .add(entity, kind);
        self.membership.insert((entity, kind), to);

        trace!(%entity, ?kind, ?from, %to, "Spatial membership changed");
        Ok(Some(CellChange { from, to }))
    }

    /// Move an already registered entity to `position`.
    ///
    /// Same as [`register_at`](Self::register_at) but refuses entities that
    /// are not registered, so a stale reference cannot silently re-insert a
    /// departed entity.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::NotRegistered`] if the entity has no chunk under
    /// `kind`, or [`WorldError::PlaneOutOfRange`] for an invalid plane.
    pub fn move_to(
        &mut self,
        entity: EntityId,
        kind: EntityType,
        position: Position,
    ) -> Result<Option<CellChange>, WorldError> {
        if !self.membership.contains_key(&(entity, kind)) {
            return Err(WorldError::NotRegistered { entity, kind });
        }
        self.register_at(entity, kind, position)
    }

    /// Remove `entity` from its chunk under `kind`.
    ///
    /// Returns the chunk it was removed from, or `None` if it was not
    /// registered.
    pub fn unregister(&mut self, entity: EntityId, kind: EntityType) -> Option<ChunkPosition> {
        let cell = self.membership.remove(&(entity, kind))?;
        if let Some(chunk) = self.chunks.get_mut(&cell) {
            chunk.remove(entity, kind);
        }
        Some(cell)
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Entities of `kind` in `cell`. Untouched cells yield an empty set.
    pub fn entities_of_type(&self, cell: ChunkPosition, kind: EntityType) -> &BTreeSet<EntityId> {
        self.chunks
            .get(&cell)
            .map_or(&EMPTY, |chunk| chunk.get_all(kind))
    }

    /// The chunk `entity` is currently registered in under `kind`.
    pub fn cell_of(&self, entity: EntityId, kind: EntityType) -> Option<ChunkPosition> {
        self.membership.get(&(entity, kind)).copied()
    }

    /// Chunks intersecting the square of `radius` tiles around `position`
    /// on the same plane, in ascending order.
    pub fn cells_in_view(position: Position, radius: u32) -> Vec<ChunkPosition> {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        let min = Position::new(
            position.x.saturating_sub(r),
            position.y.saturating_sub(r),
            position.plane,
        )
        .chunk();
        let max = Position::new(
            position.x.saturating_add(r),
            position.y.saturating_add(r),
            position.plane,
        )
        .chunk();

        (min.x..=max.x)
            .flat_map(|x| (min.y..=max.y).map(move |y| ChunkPosition::new(x, y, position.plane)))
            .collect()
    }

    /// Entities of `kind` in every chunk intersecting the view square.
    ///
    /// This is chunk-granular: entities near the edge of an outer chunk may
    /// be slightly outside `radius`. Callers that need an exact bound filter
    /// the result by position.
    pub fn entities_in_view(
        &self,
        position: Position,
        kind: EntityType,
        radius: u32,
    ) -> Vec<EntityId> {
        Self::cells_in_view(position, radius)
            .into_iter()
            .flat_map(|cell| self.entities_of_type(cell, kind).iter().copied())
            .collect()
    }

    /// Number of registered (entity, type) pairs.
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    /// Number of chunks created so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Verify the reverse map and the chunks agree.
    ///
    /// Every membership entry must be present in exactly its chunk, every
    /// chunk must sit under its own coordinates, and the total chunk
    /// population must equal the number of membership entries. Used by the
    /// tick loop in debug builds and by tests.
    pub fn is_consistent(&self) -> bool {
        let placed = self.chunks.iter().all(|(cell, chunk)| chunk.position() == *cell);
        let indexed = self.membership.iter().all(|(&(entity, kind), cell)| {
            self.chunks
                .get(cell)
                .is_some_and(|chunk| chunk.contains(entity, kind))
        });
        let population: usize = self.chunks.values().map(Chunk::len).sum();
        placed && indexed && population == self.membership.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pos(x: i32, y: i32) -> Position {
        Position::new(x, y, 0)
    }

    #[test]
    fn untouched_cell_is_empty() {
        let index = SpatialIndex::new();
        let cell = ChunkPosition::new(1000, -1000, 3);
        assert!(index.entities_of_type(cell, EntityType::Player).is_empty());
        assert_eq!(index.chunk_count(), 0);
    }

    #[test]
    fn register_places_entity_in_its_cell() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        let change = index.register_at(id, EntityType::Player, pos(3222, 3218)).unwrap();
        let cell = ChunkPosition::new(402, 402, 0);
        assert_eq!(change, Some(CellChange { from: None, to: cell }));
        assert!(index.entities_of_type(cell, EntityType::Player).contains(&id));
        assert!(index.entities_of_type(cell, EntityType::Npc).is_empty());
        assert_eq!(index.cell_of(id, EntityType::Player), Some(cell));
    }

    #[test]
    fn register_same_cell_is_noop() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.register_at(id, EntityType::Npc, pos(16, 16)).unwrap();
        let again = index.register_at(id, EntityType::Npc, pos(23, 23)).unwrap();
        assert_eq!(again, None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn register_in_other_cell_moves_entity() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.register_at(id, EntityType::Player, pos(7, 0)).unwrap();
        let change = index.register_at(id, EntityType::Player, pos(8, 0)).unwrap();
        assert_eq!(
            change,
            Some(CellChange {
                from: Some(ChunkPosition::new(0, 0, 0)),
                to: ChunkPosition::new(1, 0, 0),
            })
        );
        assert!(
            index
                .entities_of_type(ChunkPosition::new(0, 0, 0), EntityType::Player)
                .is_empty()
        );
        assert_eq!(index.len(), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn same_entity_may_hold_one_cell_per_type() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.register_at(id, EntityType::Object, pos(0, 0)).unwrap();
        index.register_at(id, EntityType::GroundItem, pos(100, 100)).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.is_consistent());
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.register_at(id, EntityType::Npc, pos(5, 5)).unwrap();
        assert_eq!(index.unregister(id, EntityType::Npc), Some(ChunkPosition::new(0, 0, 0)));
        assert_eq!(index.unregister(id, EntityType::Npc), None);
        assert!(index.is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn move_to_requires_registration() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        let result = index.move_to(id, EntityType::Player, pos(0, 0));
        assert!(matches!(result, Err(WorldError::NotRegistered { .. })));
        assert!(index.is_empty());
    }

    #[test]
    fn invalid_plane_is_rejected() {
        let mut index = SpatialIndex::new();
        let result = index.register_at(
            EntityId::new(),
            EntityType::Player,
            Position::new(0, 0, HEIGHT_LEVELS),
        );
        assert!(matches!(result, Err(WorldError::PlaneOutOfRange { .. })));
    }

    #[test]
    fn walking_across_many_cells_keeps_single_membership() {
        let mut index = SpatialIndex::new();
        let id = EntityId::new();
        index.register_at(id, EntityType::Player, pos(0, 0)).unwrap();
        for x in 1..64 {
            index.move_to(id, EntityType::Player, pos(x, x / 2)).unwrap();
            assert_eq!(index.len(), 1);
        }
        assert!(index.is_consistent());
        let population: usize = (0..8)
            .flat_map(|x| (0..8).map(move |y| ChunkPosition::new(x, y, 0)))
            .map(|c| index.entities_of_type(c, EntityType::Player).len())
            .sum();
        assert_eq!(population, 1);
    }

    #[test]
    fn cells_in_view_covers_square() {
        // 15 tiles around (100, 100) spans tiles 85..=115, chunks 10..=14.
        let cells = SpatialIndex::cells_in_view(pos(100, 100), 15);
        assert_eq!(cells.len(), 25);
        assert_eq!(cells.first(), Some(&ChunkPosition::new(10, 10, 0)));
        assert_eq!(cells.last(), Some(&ChunkPosition::new(14, 14, 0)));
    }

    #[test]
    fn entities_in_view_ignores_far_and_other_planes() {
        let mut index = SpatialIndex::new();
        let near = EntityId::new();
        let far = EntityId::new();
        let upstairs = EntityId::new();
        index.register_at(near, EntityType::Npc, pos(105, 95)).unwrap();
        index.register_at(far, EntityType::Npc, pos(200, 200)).unwrap();
        index
            .register_at(upstairs, EntityType::Npc, Position::new(100, 100, 1))
            .unwrap();

        let seen = index.entities_in_view(pos(100, 100), EntityType::Npc, 15);
        assert_eq!(seen, vec![near]);
    }
}
