//! Demo content: NPCs and bot players that wander around the spawn point.
//!
//! At startup the spawner queues NPCs scattered around the starting
//! position and, optionally, a handful of bot players. Each gets a
//! [`WanderTask`] attached to its entity, so the task is cancelled
//! automatically when the actor leaves the world.

use keystone_core::actor::{Actor, Credentials, Mob};
use keystone_core::task::{ScheduledTask, Task, TaskError, TaskHandle, TaskKey};
use keystone_core::world::{World, WorldState};
use keystone_types::{EntityId, EntityType, Position};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::EngineError;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Demo content settings, loaded from the `demo` section of
/// `keystone-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnerConfig {
    /// NPCs spawned at startup.
    #[serde(default = "default_npc_count")]
    pub npc_count: u32,

    /// Bot players logged in at startup.
    #[serde(default)]
    pub bot_players: u32,

    /// How far from its spawn point an actor may wander, in tiles.
    #[serde(default = "default_wander_radius")]
    pub wander_radius: u32,

    /// Ticks between wander decisions.
    #[serde(default = "default_wander_interval_ticks")]
    pub wander_interval_ticks: u32,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            npc_count: default_npc_count(),
            bot_players: 0,
            wander_radius: default_wander_radius(),
            wander_interval_ticks: default_wander_interval_ticks(),
        }
    }
}

const fn default_npc_count() -> u32 {
    32
}

const fn default_wander_radius() -> u32 {
    6
}

const fn default_wander_interval_ticks() -> u32 {
    5
}

// -----------------------------------------------------------------------
// Wandering
// -----------------------------------------------------------------------

/// Periodically walks an actor to a random tile near its home.
#[derive(Debug, Clone, Copy)]
pub struct WanderTask {
    entity: EntityId,
    kind: EntityType,
    home: Position,
    radius: u32,
}

impl WanderTask {
    /// Wander task for `entity` around `home`.
    pub const fn new(entity: EntityId, kind: EntityType, home: Position, radius: u32) -> Self {
        Self {
            entity,
            kind,
            home,
            radius,
        }
    }
}

impl Task<WorldState> for WanderTask {
    fn execute(&mut self, state: &mut WorldState, _handle: &TaskHandle) -> Result<(), TaskError> {
        // Not admitted yet, or already gone; departure cancels the task.
        let Some(index) = state
            .registry(self.kind)
            .and_then(|registry| registry.index_of(self.entity))
        else {
            return Ok(());
        };
        let busy = state
            .mob(self.kind, index)
            .is_some_and(|mob| !mob.walking.is_empty());
        if busy || self.radius == 0 {
            return Ok(());
        }

        let radius = i32::try_from(self.radius).unwrap_or(i32::MAX);
        let mut rng = rand::rng();
        let dx = rng.random_range(-radius..=radius);
        let dy = rng.random_range(-radius..=radius);
        let target = self
            .home
            .translate(dx, dy)
            .ok_or_else(|| TaskError::failed("wander target out of range"))?;
        let steps = state.walk_to(self.kind, index, target);
        debug!(entity = %self.entity, %target, steps, "Wandering");
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Spawning
// -----------------------------------------------------------------------

/// What the spawner queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnResult {
    /// NPCs queued for spawning.
    pub npcs: u32,
    /// Bot players queued for login.
    pub bots: u32,
}

/// Queue demo NPCs and bots around the world's starting position and
/// schedule their wander tasks.
pub fn spawn_demo_content(world: &mut World, config: &SpawnerConfig) -> Result<SpawnResult, EngineError> {
    let origin = world.state().starting_position();
    let scatter = i32::try_from(config.wander_radius.saturating_mul(2)).map_err(|e| EngineError::Spawner {
        message: format!("wander radius too large: {e}"),
    })?;
    let mut rng = rand::rng();
    let mut result = SpawnResult::default();

    for n in 0..config.npc_count {
        let home = origin
            .translate(rng.random_range(-scatter..=scatter), rng.random_range(-scatter..=scatter))
            .ok_or_else(|| EngineError::Spawner {
                message: format!("npc {n} spawn point out of range"),
            })?;
        let npc = Mob::npc(n, home).with_wander_radius(config.wander_radius);
        let entity = npc.id();
        if world.queue_spawn(npc) {
            schedule_wander(world, entity, EntityType::Npc, home, config);
            result.npcs = result.npcs.saturating_add(1);
        }
    }

    for n in 0..config.bot_players {
        let bot = Mob::player(Credentials::new(format!("bot{n}"), "bot"), origin);
        let entity = bot.id();
        if world.queue_login(bot) {
            schedule_wander(world, entity, EntityType::Player, origin, config);
            result.bots = result.bots.saturating_add(1);
        }
    }

    info!(npcs = result.npcs, bots = result.bots, "Demo content queued");
    Ok(result)
}

fn schedule_wander(world: &mut World, entity: EntityId, kind: EntityType, home: Position, config: &SpawnerConfig) {
    let task = ScheduledTask::new(WanderTask::new(entity, kind, home, config.wander_radius))
        .delay(config.wander_interval_ticks)
        .attach(TaskKey::Entity(entity));
    if world.schedule(task).is_none() {
        debug!(%entity, "Wander task rejected");
    }
}
