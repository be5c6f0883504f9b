//! World state and the [`World`] that owns it.
//!
//! [`WorldState`] is everything game logic may touch: the two registries,
//! the spatial index, the admission and eviction queues, and a buffer for
//! tasks scheduled from inside the tick. Scheduled tasks run against it
//! directly. [`World`] adds what only the tick loop needs: the scheduler,
//! the update barrier, and the collaborators. The tick itself lives in
//! [`crate::tick`].

use keystone_types::{ActorIndex, EntityState, EntityType, Position};
use keystone_world::{SpatialIndex, WorldError};
use tracing::debug;

use crate::actor::{Actor, Mob};
use crate::collab::WorldContext;
use crate::config::ServerConfig;
use crate::queue::TickQueue;
use crate::registry::Registry;
use crate::scheduler::{TaskHost, TaskManager};
use crate::sync::UpdateBarrier;
use crate::task::{ScheduledTask, TaskHandle};
use crate::tick::TickError;

/// State visible to game logic and scheduled tasks.
#[derive(Debug)]
pub struct WorldState {
    pub(crate) players: Registry<Mob>,
    pub(crate) npcs: Registry<Mob>,
    pub(crate) spatial: SpatialIndex,
    pub(crate) logins: TickQueue<Mob>,
    pub(crate) logouts: TickQueue<ActorIndex>,
    pub(crate) spawns: TickQueue<Mob>,
    pub(crate) despawns: TickQueue<ActorIndex>,
    deferred: Vec<ScheduledTask<Self>>,
    pub(crate) tick: u64,
    pub(crate) viewing_distance: u32,
    starting_position: Position,
}

impl WorldState {
    /// Empty world sized and tuned by `config`.
    pub fn new(config: &ServerConfig) -> Self {
        let world = &config.world;
        Self {
            players: Registry::new(config.capacity.max_players),
            npcs: Registry::new(config.capacity.max_npcs),
            spatial: SpatialIndex::new(),
            logins: TickQueue::new(world.login_threshold),
            logouts: TickQueue::new(world.logout_threshold),
            spawns: TickQueue::new(world.login_threshold),
            despawns: TickQueue::new(world.logout_threshold),
            deferred: Vec::new(),
            tick: 0,
            viewing_distance: world.viewing_distance,
            starting_position: world.starting_position,
        }
    }

    /// Number of the last completed tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Active players.
    pub const fn players(&self) -> &Registry<Mob> {
        &self.players
    }

    /// Active NPCs.
    pub const fn npcs(&self) -> &Registry<Mob> {
        &self.npcs
    }

    /// Spatial index.
    pub const fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Where new players appear.
    pub const fn starting_position(&self) -> Position {
        self.starting_position
    }

    /// View radius used by update encoding.
    pub const fn viewing_distance(&self) -> u32 {
        self.viewing_distance
    }

    /// Registry holding actors of `kind`, if it is an actor kind.
    pub const fn registry(&self, kind: EntityType) -> Option<&Registry<Mob>> {
        match kind {
            EntityType::Player => Some(&self.players),
            EntityType::Npc => Some(&self.npcs),
            EntityType::Object | EntityType::GroundItem => None,
        }
    }

    /// Active actor of `kind` in `index`.
    pub fn mob(&self, kind: EntityType, index: ActorIndex) -> Option<&Mob> {
        self.registry(kind)?.get(index)
    }

    /// Mutable active actor of `kind` in `index`.
    pub fn mob_mut(&mut self, kind: EntityType, index: ActorIndex) -> Option<&mut Mob> {
        match kind {
            EntityType::Player => self.players.get_mut(index),
            EntityType::Npc => self.npcs.get_mut(index),
            EntityType::Object | EntityType::GroundItem => None,
        }
    }

    /// Schedule a task from game logic. It joins the scheduler when the
    /// current pass (or the next one, outside a tick) has drained.
    pub fn schedule(&mut self, task: ScheduledTask<Self>) -> TaskHandle {
        let handle = task.handle();
        self.deferred.push(task);
        handle
    }

    /// Queue a new player for admission. Returns `false` for non-players,
    /// actors not in the `New` state, or players already queued.
    pub fn queue_login(&mut self, player: Mob) -> bool {
        if player.entity_type() != EntityType::Player || player.state() != EntityState::New {
            return false;
        }
        self.logins.push(player.id(), player)
    }

    /// Queue an active player for departure.
    pub fn queue_logout(&mut self, index: ActorIndex) -> bool {
        let Some(player) = self.players.get(index) else {
            return false;
        };
        self.logouts.push(player.id(), index)
    }

    /// Queue a new NPC for spawning.
    pub fn queue_spawn(&mut self, npc: Mob) -> bool {
        if npc.entity_type() != EntityType::Npc || npc.state() != EntityState::New {
            return false;
        }
        self.spawns.push(npc.id(), npc)
    }

    /// Queue an active NPC for removal.
    pub fn queue_despawn(&mut self, index: ActorIndex) -> bool {
        let Some(npc) = self.npcs.get(index) else {
            return false;
        };
        self.despawns.push(npc.id(), index)
    }

    /// Queue an actor's departure through the queue matching its kind.
    pub(crate) fn queue_departure(&mut self, kind: EntityType, index: ActorIndex) -> bool {
        match kind {
            EntityType::Player => self.queue_logout(index),
            EntityType::Npc => self.queue_despawn(index),
            EntityType::Object | EntityType::GroundItem => false,
        }
    }

    /// Number of players waiting for admission.
    pub fn pending_logins(&self) -> usize {
        self.logins.len()
    }

    /// Number of players waiting to depart.
    pub fn pending_logouts(&self) -> usize {
        self.logouts.len()
    }

    /// Move an active actor instantly, keeping the spatial index in step.
    /// Any queued walking is dropped.
    pub fn teleport(
        &mut self,
        kind: EntityType,
        index: ActorIndex,
        to: Position,
    ) -> Result<(), WorldError> {
        let Self {
            players,
            npcs,
            spatial,
            ..
        } = self;
        let registry = match kind {
            EntityType::Player => players,
            EntityType::Npc => npcs,
            EntityType::Object | EntityType::GroundItem => return Ok(()),
        };
        let Some(mob) = registry.get_mut(index) else {
            return Ok(());
        };
        spatial.move_to(mob.id(), kind, to)?;
        mob.set_position(to);
        mob.walking.clear();
        debug!(entity = %mob.id(), %index, %to, "Actor teleported");
        Ok(())
    }

    /// Queue a straight walk for an active actor. Returns the number of steps
    /// queued.
    pub fn walk_to(&mut self, kind: EntityType, index: ActorIndex, to: Position) -> usize {
        self.mob_mut(kind, index).map_or(0, |mob| {
            let from = mob.position();
            mob.walking.walk_to(from, to)
        })
    }
}

impl TaskHost for WorldState {
    fn take_scheduled(&mut self) -> Vec<ScheduledTask<Self>> {
        std::mem::take(&mut self.deferred)
    }
}

/// A world: state, scheduler, update barrier, and collaborators.
pub struct World {
    pub(crate) state: WorldState,
    pub(crate) tasks: TaskManager<WorldState>,
    pub(crate) barrier: UpdateBarrier,
    pub(crate) context: WorldContext,
}

impl World {
    /// Build a world from configuration and collaborators.
    pub fn new(config: &ServerConfig, context: WorldContext) -> Result<Self, TickError> {
        let barrier = UpdateBarrier::new(config.sync.worker_threads)?;
        Ok(Self {
            state: WorldState::new(config),
            tasks: TaskManager::new(),
            barrier,
            context,
        })
    }

    /// Read-only world state.
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// Mutable world state, for embedding code between ticks.
    pub const fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    /// Collaborators.
    pub const fn context(&self) -> &WorldContext {
        &self.context
    }

    /// Schedule a task now. Returns its handle if the scheduler accepted it.
    pub fn schedule(&mut self, task: ScheduledTask<WorldState>) -> Option<TaskHandle> {
        let handle = task.handle();
        self.tasks.schedule(task, &mut self.state).then_some(handle)
    }

    /// Tasks in the scheduler's pending list.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending_count()
    }

    /// See [`WorldState::queue_login`].
    pub fn queue_login(&mut self, player: Mob) -> bool {
        self.state.queue_login(player)
    }

    /// See [`WorldState::queue_logout`].
    pub fn queue_logout(&mut self, index: ActorIndex) -> bool {
        self.state.queue_logout(index)
    }

    /// See [`WorldState::queue_spawn`].
    pub fn queue_spawn(&mut self, npc: Mob) -> bool {
        self.state.queue_spawn(npc)
    }

    /// See [`WorldState::queue_despawn`].
    pub fn queue_despawn(&mut self, index: ActorIndex) -> bool {
        self.state.queue_despawn(index)
    }

    /// Number of worker threads in the update barrier.
    pub fn sync_workers(&self) -> usize {
        self.barrier.worker_count()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.state.tick)
            .field("players", &self.state.players.len())
            .field("npcs", &self.state.npcs.len())
            .field("pending_tasks", &self.tasks.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actor::Credentials;

    fn state() -> WorldState {
        WorldState::new(&ServerConfig::default())
    }

    #[test]
    fn login_queue_only_takes_new_players() {
        let mut state = state();
        let player = Mob::player(Credentials::new("a", "b"), Position::new(0, 0, 0));
        let twin = player.clone();
        assert!(state.queue_login(player));
        assert!(!state.queue_login(twin));
        assert!(!state.queue_login(Mob::npc(1, Position::new(0, 0, 0))));
        assert_eq!(state.pending_logins(), 1);

        assert!(state.queue_spawn(Mob::npc(1, Position::new(0, 0, 0))));
        assert!(!state.queue_spawn(Mob::player(Credentials::new("c", "d"), Position::new(0, 0, 0))));
    }

    #[test]
    fn departures_need_an_active_actor() {
        let mut state = state();
        assert!(!state.queue_logout(ActorIndex(0)));
        assert!(!state.queue_despawn(ActorIndex(0)));
        assert!(!state.queue_departure(EntityType::Object, ActorIndex(0)));
    }

    #[test]
    fn schedule_buffers_until_taken() {
        let mut state = state();
        let handle = state.schedule(ScheduledTask::from_fn(|_: &mut WorldState, _| Ok(())));
        assert!(!handle.is_running());
        assert_eq!(state.take_scheduled().len(), 1);
        assert!(state.take_scheduled().is_empty());
    }

    #[test]
    fn teleport_moves_spatial_membership() {
        let mut state = state();
        let mob = Mob::npc(1, Position::new(10, 10, 0));
        let id = mob.id();
        state.spatial.register_at(id, EntityType::Npc, mob.position()).unwrap();
        let index = state.npcs.add(mob).unwrap();
        state.walk_to(EntityType::Npc, index, Position::new(12, 10, 0));

        state.teleport(EntityType::Npc, index, Position::new(100, 100, 0)).unwrap();
        let npc = state.mob(EntityType::Npc, index).unwrap();
        assert_eq!(npc.position(), Position::new(100, 100, 0));
        assert!(npc.walking.is_empty());
        assert_eq!(
            state.spatial.cell_of(id, EntityType::Npc),
            Some(SpatialIndex::cell_for(Position::new(100, 100, 0)))
        );
        assert!(state.spatial.is_consistent());
    }
}
