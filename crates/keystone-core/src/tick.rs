//! The tick: six strictly ordered phases over one [`World`].
//!
//! 1. **Admission** -- drain the login and spawn queues up to their
//!    thresholds; load, index, and activate each actor.
//! 2. **Scheduler** -- exactly one scheduler pass.
//! 3. **Pre-sync** -- per actor: inbound input, walking, region checks.
//! 4. **Parallel update** -- one update unit per player on the barrier pool.
//! 5. **Post-sync** -- per actor: clear flags and per-tick state.
//! 6. **Eviction** -- drain the logout and despawn queues up to their
//!    thresholds; unindex, cancel attached tasks, save, deactivate.
//!
//! A fault in one actor during phases 3-5 forces that actor out through the
//! eviction queue and never stops the tick. Only systemic faults return a
//! [`TickError`].

use std::fmt;
use std::time::{Duration, Instant};

use keystone_types::{ActorIndex, EntityId, EntityType, UpdateFlag, WorldEvent};
use keystone_world::{SpatialIndex, WorldError, needs_region_update};
use tracing::{debug, error, info, warn};

use crate::actor::{Actor, Mob};
use crate::collab::{ConnectionError, SaveRequest, WorldContext};
use crate::fault;
use crate::movement::MovementError;
use crate::queue::TickQueue;
use crate::registry::Registry;
use crate::sync::{BarrierError, PlayerView, UnitError};
use crate::task::TaskKey;
use crate::world::{World, WorldState};

/// Systemic errors that abort a tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// Fewer update units arrived than were launched.
    #[error("tick {tick}: {arrived} of {registered} update units arrived")]
    BarrierMismatch {
        /// The tick being synchronized.
        tick: u64,
        /// Units launched.
        registered: usize,
        /// Units that arrived.
        arrived: usize,
    },

    /// The tick counter cannot advance.
    #[error("tick counter overflowed")]
    TickOverflow,

    /// The update barrier could not be built.
    #[error("update barrier error: {source}")]
    Barrier {
        /// The underlying barrier error.
        #[from]
        source: BarrierError,
    },
}

/// Why a single actor was forced out of the world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorFault {
    /// Walking queue held a bad step.
    #[error(transparent)]
    Movement(#[from] MovementError),

    /// The spatial index rejected a move.
    #[error(transparent)]
    Spatial(#[from] WorldError),

    /// Inbound input could not be handled.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The update unit failed.
    #[error(transparent)]
    Update(#[from] UnitError),

    /// The spatial index disagrees with the actor's position.
    #[error("spatial index out of step with actor position")]
    SpatialDesync,

    /// Per-actor work panicked.
    #[error("actor work panicked: {message}")]
    Panicked {
        /// Panic payload text.
        message: String,
    },
}

/// Faults collected by one phase: kind, slot, identity, and cause.
type ActorFaults = Vec<(EntityType, ActorIndex, EntityId, ActorFault)>;

/// The six tick phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Login and spawn queues.
    Admission,
    /// One scheduler pass.
    Scheduler,
    /// Input, walking, and region checks.
    PreSync,
    /// Parallel update barrier.
    ParallelUpdate,
    /// Flag and transient state reset.
    PostSync,
    /// Logout and despawn queues.
    Eviction,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Self; 6] = [
        Self::Admission,
        Self::Scheduler,
        Self::PreSync,
        Self::ParallelUpdate,
        Self::PostSync,
        Self::Eviction,
    ];

    /// Short name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Scheduler => "scheduler",
            Self::PreSync => "pre_sync",
            Self::ParallelUpdate => "parallel_update",
            Self::PostSync => "post_sync",
            Self::Eviction => "eviction",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long one phase took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    /// The phase.
    pub phase: Phase,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// An actor forced out during the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultedActor {
    /// Identity.
    pub entity: EntityId,
    /// Player or NPC.
    pub kind: EntityType,
    /// Slot at the time of the fault.
    pub index: ActorIndex,
    /// Phase in which it faulted.
    pub phase: Phase,
    /// What went wrong.
    pub fault: ActorFault,
}

/// Summary of one completed tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Players and NPCs admitted.
    pub admitted: usize,
    /// Players and NPCs evicted.
    pub evicted: usize,
    /// Scheduled task executions.
    pub tasks_run: usize,
    /// Scheduled task executions that failed.
    pub task_failures: usize,
    /// Actors forced out this tick.
    pub faulted: Vec<FaultedActor>,
    /// Active players at end of tick.
    pub players: usize,
    /// Active NPCs at end of tick.
    pub npcs: usize,
    /// Phase durations in execution order.
    pub phases: Vec<PhaseTiming>,
    /// Whole-tick duration.
    pub duration: Duration,
}

impl TickSummary {
    const fn new(tick: u64) -> Self {
        Self {
            tick,
            admitted: 0,
            evicted: 0,
            tasks_run: 0,
            task_failures: 0,
            faulted: Vec::new(),
            players: 0,
            npcs: 0,
            phases: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    fn timed<T>(&mut self, phase: Phase, work: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = work();
        let duration = started.elapsed();
        debug!(tick = self.tick, %phase, ?duration, "Phase complete");
        self.phases.push(PhaseTiming { phase, duration });
        out
    }
}

impl World {
    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::TickOverflow`] if the counter cannot advance, or
    /// [`TickError::BarrierMismatch`] if update units went missing. Per-actor
    /// and per-task faults are contained and reported in the summary.
    pub fn tick(&mut self) -> Result<TickSummary, TickError> {
        let tick = self
            .state
            .tick
            .checked_add(1)
            .ok_or(TickError::TickOverflow)?;
        self.state.tick = tick;
        let started = Instant::now();
        let mut summary = TickSummary::new(tick);

        let admitted = summary.timed(Phase::Admission, || self.admit());
        summary.admitted = admitted;

        let report = summary.timed(Phase::Scheduler, || self.tasks.run_iteration(&mut self.state));
        summary.tasks_run = report.executed;
        summary.task_failures = report.failed;

        let faults = summary.timed(Phase::PreSync, || self.pre_synchronize());
        self.force_out(faults, Phase::PreSync, &mut summary);

        let faults = summary.timed(Phase::ParallelUpdate, || self.synchronize())?;
        self.force_out(faults, Phase::ParallelUpdate, &mut summary);

        let faults = summary.timed(Phase::PostSync, || self.post_synchronize());
        self.force_out(faults, Phase::PostSync, &mut summary);

        let evicted = summary.timed(Phase::Eviction, || self.evict());
        summary.evicted = evicted;

        if cfg!(debug_assertions) && !self.state.spatial.is_consistent() {
            error!(tick, "Spatial index inconsistent at tick boundary");
        }

        summary.players = self.state.players.len();
        summary.npcs = self.state.npcs.len();
        summary.duration = started.elapsed();
        debug!(
            tick,
            admitted = summary.admitted,
            evicted = summary.evicted,
            tasks = summary.tasks_run,
            faulted = summary.faulted.len(),
            players = summary.players,
            npcs = summary.npcs,
            duration = ?summary.duration,
            "Tick complete"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Phase 1: admission
    // -----------------------------------------------------------------------

    fn admit(&mut self) -> usize {
        let WorldState {
            players,
            npcs,
            spatial,
            logins,
            spawns,
            ..
        } = &mut self.state;
        let ctx = &self.context;
        admit_from(logins, players, spatial, ctx).saturating_add(admit_from(spawns, npcs, spatial, ctx))
    }

    // -----------------------------------------------------------------------
    // Phase 3: pre-sync
    // -----------------------------------------------------------------------

    fn pre_synchronize(&mut self) -> ActorFaults {
        let WorldState {
            players,
            npcs,
            spatial,
            ..
        } = &mut self.state;
        let ctx = &self.context;
        let mut faults = Vec::new();

        for index in players.indices() {
            let Some(player) = players.get_mut(index) else {
                continue;
            };
            let entity = player.id();
            let outcome = fault::contain(
                || pre_sync_player(player, spatial, ctx),
                |message| ActorFault::Panicked { message },
            );
            if let Err(fault) = outcome {
                faults.push((EntityType::Player, index, entity, fault));
            }
        }

        for index in npcs.indices() {
            let Some(npc) = npcs.get_mut(index) else {
                continue;
            };
            let entity = npc.id();
            let outcome = fault::contain(
                || walk(npc, spatial),
                |message| ActorFault::Panicked { message },
            );
            if let Err(fault) = outcome {
                faults.push((EntityType::Npc, index, entity, fault));
            }
        }
        faults
    }

    // -----------------------------------------------------------------------
    // Phase 4: parallel update
    // -----------------------------------------------------------------------

    fn synchronize(&self) -> Result<ActorFaults, TickError> {
        let view = PlayerView {
            players: &self.state.players,
            npcs: &self.state.npcs,
            spatial: &self.state.spatial,
            viewing_distance: self.state.viewing_distance,
            tick: self.state.tick,
        };
        let report = self.barrier.run(
            &view,
            self.context.connection.as_ref(),
            self.context.encoder.as_ref(),
        );
        if !report.is_complete() {
            error!(
                tick = self.state.tick,
                registered = report.registered,
                arrived = report.arrived,
                "Update barrier mismatch"
            );
            return Err(TickError::BarrierMismatch {
                tick: self.state.tick,
                registered: report.registered,
                arrived: report.arrived,
            });
        }
        Ok(report
            .faults
            .into_iter()
            .map(|fault| (EntityType::Player, fault.index, fault.entity, ActorFault::from(fault.error)))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Phase 5: post-sync
    // -----------------------------------------------------------------------

    fn post_synchronize(&mut self) -> ActorFaults {
        let WorldState {
            players,
            npcs,
            spatial,
            ..
        } = &mut self.state;
        let mut faults = Vec::new();
        for (kind, registry) in [(EntityType::Player, players), (EntityType::Npc, npcs)] {
            for mob in registry.iter_mut() {
                let Some(index) = mob.index() else {
                    continue;
                };
                let entity = mob.id();
                let outcome = fault::contain(
                    || reset(mob, kind, spatial),
                    |message| ActorFault::Panicked { message },
                );
                if let Err(fault) = outcome {
                    faults.push((kind, index, entity, fault));
                }
            }
        }
        faults
    }

    // -----------------------------------------------------------------------
    // Phase 6: eviction
    // -----------------------------------------------------------------------

    fn evict(&mut self) -> usize {
        let WorldState {
            players,
            npcs,
            spatial,
            logouts,
            despawns,
            ..
        } = &mut self.state;
        let mut evicted = 0_usize;
        for (queue, registry) in [(logouts, players), (despawns, npcs)] {
            let threshold = queue.threshold();
            let mut processed = 0_usize;
            while processed < threshold {
                let Some((entity, index)) = queue.pop_front() else {
                    break;
                };
                processed = processed.saturating_add(1);
                if registry.get(index).is_none_or(|mob| mob.id() != entity) {
                    debug!(%entity, %index, "Stale departure request ignored");
                    continue;
                }
                let Some(mob) = registry.remove(index) else {
                    continue;
                };
                let kind = mob.entity_type();
                spatial.unregister(entity, kind);
                let cancelled = self.tasks.cancel_all(&TaskKey::Entity(entity));
                if let Some(request) = SaveRequest::for_player(&mob) {
                    self.context.saves.hand_off(request);
                }
                self.context
                    .events
                    .post(WorldEvent::ActorDeactivated { entity, kind, index });
                info!(%entity, ?kind, %index, cancelled, "Actor left the world");
                evicted = evicted.saturating_add(1);
            }
        }
        evicted
    }

    /// Queue faulted actors for departure and record them.
    fn force_out(
        &mut self,
        faults: ActorFaults,
        phase: Phase,
        summary: &mut TickSummary,
    ) {
        for (kind, index, entity, fault) in faults {
            warn!(%entity, ?kind, %index, %phase, error = %fault, "Actor faulted, forcing departure");
            self.state.queue_departure(kind, index);
            if kind == EntityType::Player {
                self.context.connection.disconnect(index);
            }
            summary.faulted.push(FaultedActor {
                entity,
                kind,
                index,
                phase,
                fault,
            });
        }
    }
}

/// Admit up to `queue`'s threshold of actors into `registry`.
///
/// Skipped requests count toward the threshold. When the registry is full
/// the rest of the queue waits for a later tick.
fn admit_from(
    queue: &mut TickQueue<Mob>,
    registry: &mut Registry<Mob>,
    spatial: &mut SpatialIndex,
    ctx: &WorldContext,
) -> usize {
    let threshold = queue.threshold();
    let mut processed = 0_usize;
    let mut admitted = 0_usize;
    while processed < threshold {
        if registry.is_full() {
            if !queue.is_empty() {
                debug!(
                    capacity = registry.capacity(),
                    waiting = queue.len(),
                    "Registry full, deferring admissions"
                );
            }
            break;
        }
        let Some((entity, mut mob)) = queue.pop_front() else {
            break;
        };
        processed = processed.saturating_add(1);
        let kind = mob.entity_type();

        if registry.index_of(entity).is_some() {
            warn!(%entity, ?kind, "Actor already active, admission skipped");
            continue;
        }
        if kind == EntityType::Player {
            let outcome = ctx.persistence.load(&mut mob);
            if !outcome.admits() {
                info!(%entity, username = ?mob.username(), ?outcome, "Login rejected");
                continue;
            }
        }
        let position = mob.position();
        if let Err(e) = spatial.register_at(entity, kind, position) {
            warn!(%entity, ?kind, error = %e, "Admission skipped, position not indexable");
            continue;
        }
        let index = match registry.add(mob) {
            Ok(index) => index,
            Err(e) => {
                spatial.unregister(entity, kind);
                warn!(%entity, ?kind, error = %e, "Admission rejected by registry");
                continue;
            }
        };
        if let Some(mob) = registry.get_mut(index) {
            mob.flags.flag(UpdateFlag::Appearance);
        }
        ctx.events.post(WorldEvent::ActorActivated {
            entity,
            kind,
            index,
            position,
        });
        info!(%entity, ?kind, %index, %position, "Actor entered the world");
        admitted = admitted.saturating_add(1);
    }
    admitted
}

/// Inbound input, walking, then the region check.
fn pre_sync_player(player: &mut Mob, spatial: &mut SpatialIndex, ctx: &WorldContext) -> Result<(), ActorFault> {
    ctx.connection.on_inbound_ready(player)?;
    walk(player, spatial)?;

    let entity = player.id();
    let position = player.position();
    if let Some(data) = player.as_player_mut() {
        if needs_region_update(&position, data.last_region.as_ref()) {
            data.last_region = Some(position);
            data.region_changed = true;
            ctx.events.post(WorldEvent::RegionChanged {
                entity,
                base: position,
            });
        }
    }
    Ok(())
}

/// Advance the walking queue and follow any cell crossing in the index.
fn walk(mob: &mut Mob, spatial: &mut SpatialIndex) -> Result<(), ActorFault> {
    if let Some(step) = mob.process_movement()? {
        spatial.move_to(mob.id(), mob.entity_type(), step.to)?;
    }
    Ok(())
}

/// Clear per-tick state and confirm the index agrees with the position.
fn reset(mob: &mut Mob, kind: EntityType, spatial: &SpatialIndex) -> Result<(), ActorFault> {
    mob.reset_tick_state();
    let expected = SpatialIndex::cell_for(mob.position());
    if spatial.cell_of(mob.id(), kind) == Some(expected) {
        Ok(())
    } else {
        Err(ActorFault::SpatialDesync)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use keystone_types::Position;

    use super::*;
    use crate::config::ServerConfig;

    fn world() -> World {
        let mut config = ServerConfig::default();
        config.sync.worker_threads = 2;
        let (context, _saves) = WorldContext::detached(8);
        World::new(&config, context).unwrap()
    }

    #[test]
    fn desynced_npc_is_despawned_in_post_sync() {
        let mut world = world();
        world.queue_spawn(Mob::npc(1, Position::new(3222, 3218, 0)));
        world.queue_spawn(Mob::npc(2, Position::new(3222, 3218, 0)));
        world.tick().unwrap();
        let index = world.state().npcs().indices()[0];
        let entity = world.state().npcs().get(index).unwrap().id();

        // Moved without telling the index.
        world
            .state_mut()
            .mob_mut(EntityType::Npc, index)
            .unwrap()
            .set_position(Position::new(3300, 3300, 0));

        let summary = world.tick().unwrap();
        assert_eq!(summary.faulted.len(), 1);
        let fault = &summary.faulted[0];
        assert_eq!(fault.entity, entity);
        assert_eq!(fault.kind, EntityType::Npc);
        assert_eq!(fault.phase, Phase::PostSync);
        assert_eq!(fault.fault, ActorFault::SpatialDesync);
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.npcs, 1);
        assert!(world.state().npcs().index_of(entity).is_none());
        assert_eq!(world.state().spatial().cell_of(entity, EntityType::Npc), None);
        assert!(world.state().spatial().is_consistent());
        assert_eq!(world.state().spatial().len(), 1);
    }

    #[test]
    fn forced_npc_departure_goes_through_the_despawn_queue() {
        let mut world = world();
        world.queue_spawn(Mob::npc(1, Position::new(3222, 3218, 0)));
        world.tick().unwrap();
        let index = world.state().npcs().indices()[0];

        world.state_mut().queue_departure(EntityType::Npc, index);
        assert_eq!(world.state().despawns.len(), 1);
        assert_eq!(world.state().logouts.len(), 0);

        let summary = world.tick().unwrap();
        assert_eq!(summary.evicted, 1);
        assert!(world.state().despawns.is_empty());
        assert!(world.state().npcs().is_empty());
    }
}
