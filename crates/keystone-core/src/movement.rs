//! Per-mob walking queue.
//!
//! Game logic and inbound walk requests fill the queue with single-tile
//! steps; pre-sync pops one step per tick (two when running). A queued step
//! that is not adjacent to the mob's current tile is a fault: the queue is
//! cleared and the error is reported so the tick loop can act on it.

use std::cmp::Ordering;
use std::collections::VecDeque;

use keystone_types::{Direction, Position};

/// Longest path accepted by [`WalkingQueue::walk_to`], in steps.
pub const MAX_PATH_STEPS: usize = 64;

/// Errors raised while processing queued movement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MovementError {
    /// A queued step is not one tile away from the current position.
    #[error("step from {from} to {to} is not adjacent")]
    NonAdjacentStep {
        /// Where the mob was.
        from: Position,
        /// The queued step.
        to: Position,
    },
}

/// The movement applied to a mob during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Position before moving.
    pub from: Position,
    /// Position after moving.
    pub to: Position,
    /// First step's direction.
    pub walk: Direction,
    /// Second step's direction when running.
    pub run: Option<Direction>,
}

/// Queue of pending single-tile steps.
#[derive(Debug, Clone, Default)]
pub struct WalkingQueue {
    /// Steps to take, front first.
    steps: VecDeque<Position>,
    /// Whether two steps are taken per tick.
    running: bool,
}

impl WalkingQueue {
    /// Create an empty, walking (not running) queue.
    pub const fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            running: false,
        }
    }

    /// Append a single step.
    pub fn add_step(&mut self, step: Position) {
        self.steps.push_back(step);
    }

    /// Replace the queue with a straight path from `from` towards `to`:
    /// diagonal steps first, then straight ones. Returns the number of steps
    /// queued, capped at [`MAX_PATH_STEPS`].
    pub fn walk_to(&mut self, from: Position, to: Position) -> usize {
        self.steps.clear();
        let mut current = from;
        while current != to && self.steps.len() < MAX_PATH_STEPS && current.plane == to.plane {
            let dx = unit(to.x.cmp(&current.x));
            let dy = unit(to.y.cmp(&current.y));
            let Some(next) = current.translate(dx, dy) else {
                break;
            };
            self.steps.push_back(next);
            current = next;
        }
        self.steps.len()
    }

    /// Drop all queued steps.
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Number of queued steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps are queued.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether two steps are taken per tick.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Toggle running.
    pub const fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Pop this tick's step(s) starting from `current`.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`MovementError::NonAdjacentStep`] if a queued step is not one
    /// tile away. The queue is cleared in that case.
    pub fn process(&mut self, current: Position) -> Result<Option<Step>, MovementError> {
        let Some(first) = self.steps.pop_front() else {
            return Ok(None);
        };
        let walk = self.direction_between(current, first)?;

        let mut to = first;
        let mut run = None;
        if self.running {
            if let Some(second) = self.steps.pop_front() {
                run = Some(self.direction_between(first, second)?);
                to = second;
            }
        }

        Ok(Some(Step {
            from: current,
            to,
            walk,
            run,
        }))
    }

    /// Direction of a one-tile step, clearing the queue if it is not one.
    fn direction_between(&mut self, from: Position, to: Position) -> Result<Direction, MovementError> {
        let delta = to
            .x
            .checked_sub(from.x)
            .zip(to.y.checked_sub(from.y))
            .filter(|_| to.plane == from.plane);
        match delta.and_then(|(dx, dy)| Direction::from_delta(dx, dy)) {
            Some(direction) => Ok(direction),
            None => {
                self.steps.clear();
                Err(MovementError::NonAdjacentStep { from, to })
            }
        }
    }
}

/// One-tile delta towards a target along an axis.
const fn unit(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
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
    fn empty_queue_yields_nothing() {
        let mut queue = WalkingQueue::new();
        assert_eq!(queue.process(pos(0, 0)).unwrap(), None);
    }

    #[test]
    fn walking_takes_one_step_per_tick() {
        let mut queue = WalkingQueue::new();
        queue.walk_to(pos(0, 0), pos(3, 0));
        assert_eq!(queue.len(), 3);

        let step = queue.process(pos(0, 0)).unwrap().unwrap();
        assert_eq!(step.to, pos(1, 0));
        assert_eq!(step.walk, Direction::East);
        assert_eq!(step.run, None);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn running_takes_two_steps_per_tick() {
        let mut queue = WalkingQueue::new();
        queue.set_running(true);
        queue.walk_to(pos(0, 0), pos(2, 2));

        let step = queue.process(pos(0, 0)).unwrap().unwrap();
        assert_eq!(step.to, pos(2, 2));
        assert_eq!(step.walk, Direction::NorthEast);
        assert_eq!(step.run, Some(Direction::NorthEast));
        assert!(queue.is_empty());
    }

    #[test]
    fn path_goes_diagonal_then_straight() {
        let mut queue = WalkingQueue::new();
        queue.walk_to(pos(0, 0), pos(3, 1));
        let mut at = pos(0, 0);
        let mut dirs = Vec::new();
        while let Some(step) = queue.process(at).unwrap() {
            dirs.push(step.walk);
            at = step.to;
        }
        assert_eq!(at, pos(3, 1));
        assert_eq!(dirs, vec![Direction::NorthEast, Direction::East, Direction::East]);
    }

    #[test]
    fn long_paths_are_capped() {
        let mut queue = WalkingQueue::new();
        assert_eq!(queue.walk_to(pos(0, 0), pos(1000, 0)), MAX_PATH_STEPS);
    }

    #[test]
    fn non_adjacent_step_is_error_and_clears() {
        let mut queue = WalkingQueue::new();
        queue.add_step(pos(5, 5));
        queue.add_step(pos(6, 5));
        let err = queue.process(pos(0, 0)).unwrap_err();
        assert_eq!(
            err,
            MovementError::NonAdjacentStep {
                from: pos(0, 0),
                to: pos(5, 5)
            }
        );
        assert!(queue.is_empty());
    }
}
