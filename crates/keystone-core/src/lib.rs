//! Tick orchestration, task scheduling, and parallel synchronization for the
//! Keystone world server.
//!
//! This crate owns the six-phase tick that drives the world: Admission,
//! Scheduler, Pre-sync, Parallel update, Post-sync, and Eviction.
//!
//! # Modules
//!
//! - [`actor`] -- The [`Actor`] capability trait and the [`Mob`] actor type.
//! - [`collab`] -- Collaborator traits (connection, persistence, events,
//!   encoder) and the save channel.
//! - [`config`] -- Configuration loading from `keystone-config.yaml` into
//!   strongly-typed structs.
//! - [`fault`] -- Panic and error containment for per-actor and per-task work.
//! - [`movement`] -- Per-mob walking queue.
//! - [`queue`] -- Bounded-per-tick admission and eviction queues.
//! - [`registry`] -- Slot-indexed actor storage.
//! - [`runner`] -- Fixed-cadence async server loop.
//! - [`scheduler`] -- Cooperative [`TaskManager`].
//! - [`sync`] -- Parallel update barrier.
//! - [`task`] -- Scheduled tasks and their handles.
//! - [`tick`] -- The six-phase tick.
//! - [`world`] -- [`World`] and the [`WorldState`] game logic works on.
//!
//! [`Actor`]: actor::Actor
//! [`Mob`]: actor::Mob
//! [`TaskManager`]: scheduler::TaskManager
//! [`World`]: world::World
//! [`WorldState`]: world::WorldState

pub mod actor;
pub mod collab;
pub mod config;
pub mod fault;
pub mod movement;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod tick;
pub mod world;
