//! The actor model: players and NPCs sharing one [`Mob`] type.
//!
//! Registries are generic over the [`Actor`] capability trait so they can
//! hold any slot-indexed entity. [`Mob`] is the one implementation the world
//! uses; variant-specific data lives in [`MobKind`].

use std::collections::BTreeSet;
use std::fmt;

use keystone_types::{ActorIndex, EntityId, EntityState, EntityType, Position, UpdateFlag};

use crate::movement::{MovementError, Step, WalkingQueue};

/// Capabilities a registry needs from the entities it stores.
pub trait Actor: Send + Sync {
    /// Stable identity of the actor.
    fn id(&self) -> EntityId;

    /// Which registry/spatial set the actor belongs to.
    fn entity_type(&self) -> EntityType;

    /// Registry slot, present only while active.
    fn index(&self) -> Option<ActorIndex>;

    /// Lifecycle state.
    fn state(&self) -> EntityState;

    /// Current world position.
    fn position(&self) -> Position;

    /// Called by the registry when the actor takes a slot.
    fn activate(&mut self, index: ActorIndex);

    /// Called by the registry when the actor leaves its slot.
    fn deactivate(&mut self);
}

/// Pending per-tick update flags, cleared in post-sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFlags(BTreeSet<UpdateFlag>);

impl UpdateFlags {
    /// Raise a flag.
    pub fn flag(&mut self, flag: UpdateFlag) {
        self.0.insert(flag);
    }

    /// Whether a flag is raised.
    pub fn get(&self, flag: UpdateFlag) -> bool {
        self.0.contains(&flag)
    }

    /// Whether any flag is raised.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raised flags in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = UpdateFlag> + '_ {
        self.0.iter().copied()
    }

    /// Lower every flag.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Login credentials. The password never appears in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name, also the display name.
    pub username: String,
    /// Plain-text password as received at login.
    pub password: String,
}

impl Credentials {
    /// Build credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Player-only state.
#[derive(Debug, Clone)]
pub struct PlayerData {
    /// Login credentials.
    pub credentials: Credentials,
    /// Position the client's loaded map region was built around.
    pub last_region: Option<Position>,
    /// Set in pre-sync when a new region was sent this tick.
    pub region_changed: bool,
    /// Chat message spoken this tick.
    pub chat: Option<String>,
}

/// NPC-only state.
#[derive(Debug, Clone, Copy)]
pub struct NpcData {
    /// Content definition id.
    pub definition: u32,
    /// Spawn point.
    pub home: Position,
    /// How far from home the NPC may roam, in tiles.
    pub wander_radius: u32,
}

/// Variant-specific actor data.
#[derive(Debug, Clone)]
pub enum MobKind {
    /// A connected player.
    Player(Box<PlayerData>),
    /// A non-player character.
    Npc(NpcData),
}

/// A player or non-player mob.
#[derive(Debug, Clone)]
pub struct Mob {
    /// Stable identity.
    id: EntityId,
    /// Registry slot while active.
    index: Option<ActorIndex>,
    /// Lifecycle state.
    state: EntityState,
    /// Current position. Only the world moves mobs so the spatial index
    /// stays in step.
    position: Position,
    /// Pending update flags.
    pub flags: UpdateFlags,
    /// Queued steps.
    pub walking: WalkingQueue,
    /// Movement applied this tick.
    last_step: Option<Step>,
    /// Variant data.
    pub kind: MobKind,
}

impl Mob {
    /// A new player at `position`, not yet admitted.
    pub fn player(credentials: Credentials, position: Position) -> Self {
        Self::with_kind(
            MobKind::Player(Box::new(PlayerData {
                credentials,
                last_region: None,
                region_changed: false,
                chat: None,
            })),
            position,
        )
    }

    /// A new NPC at `position`, not yet spawned.
    pub fn npc(definition: u32, position: Position) -> Self {
        Self::with_kind(
            MobKind::Npc(NpcData {
                definition,
                home: position,
                wander_radius: 0,
            }),
            position,
        )
    }

    fn with_kind(kind: MobKind, position: Position) -> Self {
        Self {
            id: EntityId::new(),
            index: None,
            state: EntityState::New,
            position,
            flags: UpdateFlags::default(),
            walking: WalkingQueue::new(),
            last_step: None,
            kind,
        }
    }

    /// Set how far an NPC may wander from home. No effect on players.
    #[must_use]
    pub fn with_wander_radius(mut self, radius: u32) -> Self {
        if let MobKind::Npc(npc) = &mut self.kind {
            npc.wander_radius = radius;
        }
        self
    }

    /// Player data, if this is a player.
    pub fn as_player(&self) -> Option<&PlayerData> {
        match &self.kind {
            MobKind::Player(player) => Some(player.as_ref()),
            MobKind::Npc(_) => None,
        }
    }

    /// Mutable player data, if this is a player.
    pub fn as_player_mut(&mut self) -> Option<&mut PlayerData> {
        match &mut self.kind {
            MobKind::Player(player) => Some(player.as_mut()),
            MobKind::Npc(_) => None,
        }
    }

    /// NPC data, if this is an NPC.
    pub const fn as_npc(&self) -> Option<&NpcData> {
        match &self.kind {
            MobKind::Npc(npc) => Some(npc),
            MobKind::Player(_) => None,
        }
    }

    /// Username for players.
    pub fn username(&self) -> Option<&str> {
        self.as_player().map(|p| p.credentials.username.as_str())
    }

    /// Movement applied this tick, if any.
    pub const fn last_step(&self) -> Option<&Step> {
        self.last_step.as_ref()
    }

    /// Say something this tick.
    pub fn chat(&mut self, message: impl Into<String>) {
        if let Some(player) = self.as_player_mut() {
            player.chat = Some(message.into());
        }
        self.flags.flag(UpdateFlag::Chat);
    }

    /// Place the mob without walking. Callers must keep the spatial index in
    /// step.
    pub(crate) const fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Advance the walking queue by one tick and record the step taken.
    pub(crate) fn process_movement(&mut self) -> Result<Option<Step>, MovementError> {
        let step = self.walking.process(self.position)?;
        if let Some(step) = step {
            self.position = step.to;
        }
        self.last_step = step;
        Ok(step)
    }

    /// Clear flags and per-tick transient state.
    pub(crate) fn reset_tick_state(&mut self) {
        self.flags.clear();
        self.last_step = None;
        if let Some(player) = self.as_player_mut() {
            player.region_changed = false;
            player.chat = None;
        }
    }
}

impl Actor for Mob {
    fn id(&self) -> EntityId {
        self.id
    }

    fn entity_type(&self) -> EntityType {
        match self.kind {
            MobKind::Player(_) => EntityType::Player,
            MobKind::Npc(_) => EntityType::Npc,
        }
    }

    fn index(&self) -> Option<ActorIndex> {
        self.index
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn position(&self) -> Position {
        self.position
    }

    fn activate(&mut self, index: ActorIndex) {
        self.index = Some(index);
        self.state = EntityState::Active;
    }

    fn deactivate(&mut self) {
        self.index = None;
        self.state = EntityState::Inactive;
    }
}
