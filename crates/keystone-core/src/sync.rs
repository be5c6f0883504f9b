//! Parallel update barrier.
//!
//! Phase four of the tick fans out one unit of work per active player onto
//! a bounded [`rayon`] pool. Each unit encodes the player's view, hands the
//! payload to the player's connection, and flushes it. The tick thread
//! blocks at the end of the pool scope until every unit has arrived, whether
//! it succeeded, failed, or panicked.
//!
//! Units only read shared world state; the registries and spatial index are
//! borrowed immutably for the duration of the scope.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::unbounded;
use keystone_types::{ActorIndex, EntityId, EntityType};
use keystone_world::SpatialIndex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::actor::{Actor, Mob};
use crate::collab::{Connection, ConnectionError, EncodeError, UpdateEncoder};
use crate::fault;
use crate::registry::Registry;

/// Fallback worker count when available parallelism is unknown.
const FALLBACK_WORKERS: usize = 4;

/// Errors building the barrier.
#[derive(Debug, thiserror::Error)]
pub enum BarrierError {
    /// The worker pool could not be started.
    #[error("failed to build sync worker pool: {source}")]
    PoolBuild {
        /// Underlying rayon error.
        #[from]
        source: rayon::ThreadPoolBuildError,
    },
}

/// Why one player's update unit failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// The encoder rejected the view.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The connection rejected the payload or the flush.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The unit panicked.
    #[error("update unit panicked: {message}")]
    Panicked {
        /// Panic payload text.
        message: String,
    },
}

/// A failed unit, reported back to the tick thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFault {
    /// Player slot.
    pub index: ActorIndex,
    /// Player identity.
    pub entity: EntityId,
    /// What went wrong.
    pub error: UnitError,
}

/// Outcome of one barrier run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierReport {
    /// Units launched (the snapshot size).
    pub registered: usize,
    /// Units that signalled arrival.
    pub arrived: usize,
    /// Units that failed.
    pub faults: Vec<UnitFault>,
}

impl BarrierReport {
    /// Whether every registered unit arrived.
    pub const fn is_complete(&self) -> bool {
        self.registered == self.arrived
    }
}

/// Read-only world state visible to one update unit.
#[derive(Debug, Clone, Copy)]
pub struct PlayerView<'a> {
    /// Active players.
    pub players: &'a Registry<Mob>,
    /// Active NPCs.
    pub npcs: &'a Registry<Mob>,
    /// Spatial index.
    pub spatial: &'a SpatialIndex,
    /// View radius in tiles.
    pub viewing_distance: u32,
    /// Tick being synchronized.
    pub tick: u64,
}

impl<'a> PlayerView<'a> {
    /// Other players within viewing distance of `viewer`, in slot order.
    pub fn local_players(&self, viewer: &Mob) -> Vec<&'a Mob> {
        self.local(self.players, EntityType::Player, viewer)
    }

    /// NPCs within viewing distance of `viewer`, in slot order.
    pub fn local_npcs(&self, viewer: &Mob) -> Vec<&'a Mob> {
        self.local(self.npcs, EntityType::Npc, viewer)
    }

    fn local(&self, registry: &'a Registry<Mob>, kind: EntityType, viewer: &Mob) -> Vec<&'a Mob> {
        let origin = viewer.position();
        let mut found: Vec<(ActorIndex, &'a Mob)> = self
            .spatial
            .entities_in_view(origin, kind, self.viewing_distance)
            .into_iter()
            .filter(|&entity| entity != viewer.id())
            .filter_map(|entity| registry.get_by_id(entity))
            .filter(|mob| origin.is_within_distance(&mob.position(), self.viewing_distance))
            .filter_map(|mob| Some((mob.index()?, mob)))
            .collect();
        found.sort_unstable_by_key(|(index, _)| *index);
        found.into_iter().map(|(_, mob)| mob).collect()
    }
}

/// Signals arrival when dropped, so a unit arrives even if it unwinds.
struct Arrival<'a>(&'a AtomicUsize);

impl Drop for Arrival<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Worker pool plus the fan-out/join logic for the parallel update phase.
#[derive(Debug)]
pub struct UpdateBarrier {
    pool: ThreadPool,
}

impl UpdateBarrier {
    /// Build the pool. `worker_threads == 0` sizes it to available
    /// parallelism.
    pub fn new(worker_threads: usize) -> Result<Self, BarrierError> {
        let workers = if worker_threads == 0 {
            thread::available_parallelism().map_or(FALLBACK_WORKERS, std::num::NonZeroUsize::get)
        } else {
            worker_threads
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("keystone-sync-{i}"))
            .build()?;
        debug!(workers, "Sync worker pool started");
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one unit per active player and wait for all of them.
    pub fn run(
        &self,
        view: &PlayerView<'_>,
        connection: &dyn Connection,
        encoder: &dyn UpdateEncoder,
    ) -> BarrierReport {
        let units: Vec<(ActorIndex, &Mob)> = view
            .players
            .iter()
            .filter_map(|player| Some((player.index()?, player)))
            .collect();
        let registered = units.len();
        let arrived = AtomicUsize::new(0);
        let (fault_tx, fault_rx) = unbounded();

        self.pool.scope(|scope| {
            for &(index, player) in &units {
                let arrived = &arrived;
                let fault_tx = fault_tx.clone();
                scope.spawn(move |_| {
                    let _arrival = Arrival(arrived);
                    let outcome = fault::contain(
                        || update_player(index, player, view, connection, encoder),
                        |message| UnitError::Panicked { message },
                    );
                    if let Err(error) = outcome {
                        let fault = UnitFault {
                            index,
                            entity: player.id(),
                            error,
                        };
                        if fault_tx.send(fault).is_err() {
                            warn!(%index, "fault channel closed before unit reported");
                        }
                    }
                });
            }
        });
        drop(fault_tx);

        let mut faults: Vec<UnitFault> = fault_rx.try_iter().collect();
        faults.sort_unstable_by_key(|fault| fault.index);
        BarrierReport {
            registered,
            arrived: arrived.load(Ordering::Acquire),
            faults,
        }
    }
}

/// Encode, enqueue, and flush one player's update.
fn update_player(
    index: ActorIndex,
    player: &Mob,
    view: &PlayerView<'_>,
    connection: &dyn Connection,
    encoder: &dyn UpdateEncoder,
) -> Result<(), UnitError> {
    let payload = encoder.encode(player, view)?;
    connection.enqueue_outbound(index, payload)?;
    connection.flush(index)?;
    Ok(())
}
