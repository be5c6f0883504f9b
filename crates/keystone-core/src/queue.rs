//! Bounded-per-tick admission and eviction queues.
//!
//! Requests may pile up without limit between ticks, but each tick only
//! drains up to the queue's threshold so a burst of logins or logouts is
//! spread across several ticks instead of overrunning one.

use std::collections::{BTreeSet, VecDeque};

use keystone_types::EntityId;

/// FIFO of per-entity requests, drained at most `threshold` per tick.
#[derive(Debug, Clone)]
pub struct TickQueue<T> {
    entries: VecDeque<(EntityId, T)>,
    keys: BTreeSet<EntityId>,
    threshold: usize,
}

impl<T> TickQueue<T> {
    /// Create an empty queue draining up to `threshold` entries per tick.
    pub const fn new(threshold: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            keys: BTreeSet::new(),
            threshold,
        }
    }

    /// Enqueue a request for `entity`. A second request for an entity that is
    /// already queued is ignored; returns whether it was added.
    pub fn push(&mut self, entity: EntityId, item: T) -> bool {
        if !self.keys.insert(entity) {
            return false;
        }
        self.entries.push_back((entity, item));
        true
    }

    /// Take the oldest request.
    pub fn pop_front(&mut self) -> Option<(EntityId, T)> {
        let (entity, item) = self.entries.pop_front()?;
        self.keys.remove(&entity);
        Some((entity, item))
    }

    /// Most entries drained per tick.
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut queue = TickQueue::new(10);
        let ids: Vec<_> = (0..3).map(|_| EntityId::new()).collect();
        for (n, id) in ids.iter().enumerate() {
            assert!(queue.push(*id, n));
        }
        assert_eq!(queue.pop_front().unwrap(), (ids[0], 0));
        assert_eq!(queue.pop_front().unwrap(), (ids[1], 1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut queue = TickQueue::new(10);
        let id = EntityId::new();
        assert!(queue.push(id, 1));
        assert!(!queue.push(id, 2));
        assert_eq!(queue.len(), 1);

        queue.pop_front().unwrap();
        assert!(queue.is_empty());
        assert!(queue.push(id, 4));
        assert_eq!(queue.threshold(), 10);
    }
}
