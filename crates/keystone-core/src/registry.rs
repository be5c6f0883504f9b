//! Capacity-bounded, slot-indexed actor storage.
//!
//! Each admitted actor takes the lowest free slot and keeps it until it is
//! removed. A slot is only handed out again after its previous occupant has
//! been removed, so an [`ActorIndex`] never names two live actors at once.

use std::collections::{BTreeMap, BTreeSet};

use keystone_types::{ActorIndex, EntityId, EntityState};
use tracing::trace;

use crate::actor::Actor;

/// Largest capacity a registry can have; indices are 16-bit.
pub const MAX_CAPACITY: usize = 1 << 16;

/// Errors returned when adding to a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Every slot is taken.
    #[error("registry is full ({capacity} slots)")]
    CapacityExceeded {
        /// Configured capacity.
        capacity: usize,
    },

    /// Only actors in the `New` state can be admitted.
    #[error("entity {entity} cannot be admitted from state {state:?}")]
    InvalidState {
        /// The rejected entity.
        entity: EntityId,
        /// Its state at the time.
        state: EntityState,
    },

    /// The entity already holds a slot.
    #[error("entity {entity} is already registered")]
    Duplicate {
        /// The rejected entity.
        entity: EntityId,
    },
}

/// Slot-indexed storage for one kind of actor.
#[derive(Debug)]
pub struct Registry<A> {
    /// Slot storage; never longer than `capacity`.
    slots: Vec<Option<A>>,
    /// Vacated slots below `slots.len()`.
    free: BTreeSet<usize>,
    /// Entity id to slot for every occupant.
    ids: BTreeMap<EntityId, ActorIndex>,
    /// Maximum number of occupants.
    capacity: usize,
}

impl<A: Actor> Registry<A> {
    /// Create an empty registry. Capacity is clamped to [`MAX_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            ids: BTreeMap::new(),
            capacity: capacity.min(MAX_CAPACITY),
        }
    }

    /// Admit an actor into the lowest free slot.
    ///
    /// The actor's index is set and it becomes `Active`. A rejected actor is
    /// dropped; callers that want to retry check [`Registry::is_full`] first.
    pub fn add(&mut self, mut actor: A) -> Result<ActorIndex, RegistryError> {
        let entity = actor.id();
        let state = actor.state();
        if state != EntityState::New {
            return Err(RegistryError::InvalidState { entity, state });
        }
        if self.ids.contains_key(&entity) {
            return Err(RegistryError::Duplicate { entity });
        }
        let capacity = self.capacity;

        let slot = match self.free.pop_first() {
            Some(slot) => slot,
            None if self.slots.len() < self.capacity => {
                self.slots.push(None);
                self.slots.len().saturating_sub(1)
            }
            None => return Err(RegistryError::CapacityExceeded { capacity }),
        };
        let Some(index) = ActorIndex::from_slot(slot) else {
            return Err(RegistryError::CapacityExceeded { capacity });
        };

        actor.activate(index);
        if let Some(cell) = self.slots.get_mut(slot) {
            *cell = Some(actor);
        }
        self.ids.insert(entity, index);
        trace!(%entity, %index, "Registry slot assigned");
        Ok(index)
    }

    /// Remove the actor in `index`, leaving it `Inactive` and unindexed.
    pub fn remove(&mut self, index: ActorIndex) -> Option<A> {
        let slot = index.slot();
        let mut actor = self.slots.get_mut(slot)?.take()?;
        self.ids.remove(&actor.id());
        actor.deactivate();

        // Trailing vacancies shrink the storage instead of joining the free set.
        if slot.saturating_add(1) == self.slots.len() {
            self.slots.pop();
            while matches!(self.slots.last(), Some(None)) {
                self.slots.pop();
                self.free.remove(&self.slots.len());
            }
        } else {
            self.free.insert(slot);
        }
        trace!(entity = %actor.id(), %index, "Registry slot released");
        Some(actor)
    }

    /// Actor in `index`.
    pub fn get(&self, index: ActorIndex) -> Option<&A> {
        self.slots.get(index.slot()).and_then(Option::as_ref)
    }

    /// Mutable actor in `index`.
    pub fn get_mut(&mut self, index: ActorIndex) -> Option<&mut A> {
        self.slots.get_mut(index.slot()).and_then(Option::as_mut)
    }

    /// Slot currently held by `entity`.
    pub fn index_of(&self, entity: EntityId) -> Option<ActorIndex> {
        self.ids.get(&entity).copied()
    }

    /// Actor with the given entity id.
    pub fn get_by_id(&self, entity: EntityId) -> Option<&A> {
        self.index_of(entity).and_then(|index| self.get(index))
    }

    /// Occupants in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.slots.iter().flatten()
    }

    /// Mutable occupants in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut A> {
        self.slots.iter_mut().flatten()
    }

    /// Occupied indices in slot order.
    pub fn indices(&self) -> Vec<ActorIndex> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(slot, _)| ActorIndex::from_slot(slot))
            .collect()
    }

    /// First occupant, in slot order, matching `predicate`.
    pub fn find_first(&self, mut predicate: impl FnMut(&A) -> bool) -> Option<&A> {
        self.iter().find(|actor| predicate(actor))
    }

    /// Number of occupants.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether there are no occupants.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Maximum number of occupants.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}
