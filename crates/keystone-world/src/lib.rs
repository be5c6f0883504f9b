//! Spatial partitioning for the Keystone tick engine.
//!
//! The world is cut into 8x8 tile chunks. The [`SpatialIndex`] stores which
//! entities are in which chunk, per entity type, so that visibility and
//! update-scope queries only touch the chunks around a position.
//!
//! # Modules
//!
//! - [`chunk`] -- A single chunk's per-type entity sets.
//! - [`error`] -- Error types for index operations.
//! - [`region`] -- Client map-region boundary checks.
//! - [`spatial`] -- The chunk index with its entity-to-chunk reverse map.

pub mod chunk;
pub mod error;
pub mod region;
pub mod spatial;

// Re-export primary types at crate root.
pub use chunk::Chunk;
pub use error::WorldError;
pub use region::needs_region_update;
pub use spatial::{CellChange, SpatialIndex};

/// Default distance, in tiles, at which players see other actors.
pub const VIEWING_DISTANCE: u32 = 15;
