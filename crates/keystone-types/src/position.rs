//! World coordinates and the chunk grid.
//!
//! The world is a set of height planes, each an unbounded integer grid of
//! tiles. Tiles are grouped into 8x8 chunks; chunk coordinates are derived
//! from tile coordinates by euclidean division, so negative coordinates map
//! to the chunk below rather than towards zero.
//!
//! Clients render a "region" of 13x13 chunks centred on a base chunk. The
//! region's south-west corner sits 6 chunks below the base chunk on each
//! axis, which is what [`Position::region_x`] and [`Position::local_x`]
//! compute.

use serde::{Deserialize, Serialize};

use crate::enums::Direction;

/// Side length of a chunk in tiles.
pub const CHUNK_SIZE: i32 = 8;

/// Number of height planes.
pub const HEIGHT_LEVELS: u8 = 4;

/// Chunks between a region's south-west corner and its base chunk.
const REGION_OFFSET_CHUNKS: i32 = 6;

/// A tile position on a height plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Tile x coordinate.
    pub x: i32,
    /// Tile y coordinate.
    pub y: i32,
    /// Height plane, `0..HEIGHT_LEVELS`.
    pub plane: u8,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32, plane: u8) -> Self {
        Self { x, y, plane }
    }

    /// The chunk containing this tile.
    pub const fn chunk(&self) -> ChunkPosition {
        ChunkPosition {
            x: self.x.div_euclid(CHUNK_SIZE),
            y: self.y.div_euclid(CHUNK_SIZE),
            plane: self.plane,
        }
    }

    /// Offset by `(dx, dy)` on the same plane, or `None` on overflow.
    pub fn translate(&self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
            plane: self.plane,
        })
    }

    /// The adjacent tile in `direction`, or `None` on overflow.
    pub fn step(&self, direction: Direction) -> Option<Self> {
        let (dx, dy) = direction.delta();
        self.translate(dx, dy)
    }

    /// Whether `other` is on the same plane and within `distance` tiles on
    /// both axes (a square, not a circle).
    pub const fn is_within_distance(&self, other: &Self, distance: u32) -> bool {
        self.plane == other.plane
            && self.x.abs_diff(other.x) <= distance
            && self.y.abs_diff(other.y) <= distance
    }

    /// Chunk x of the south-west corner of the region based on this tile.
    pub const fn region_x(&self) -> i32 {
        self.chunk().x.saturating_sub(REGION_OFFSET_CHUNKS)
    }

    /// Chunk y of the south-west corner of the region based on this tile.
    pub const fn region_y(&self) -> i32 {
        self.chunk().y.saturating_sub(REGION_OFFSET_CHUNKS)
    }

    /// This tile's x relative to the region based on `base`.
    pub const fn local_x(&self, base: &Self) -> i32 {
        self.x
            .saturating_sub(base.region_x().saturating_mul(CHUNK_SIZE))
    }

    /// This tile's y relative to the region based on `base`.
    pub const fn local_y(&self, base: &Self) -> i32 {
        self.y
            .saturating_sub(base.region_y().saturating_mul(CHUNK_SIZE))
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.plane)
    }
}

/// Coordinates of an 8x8 chunk on a height plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkPosition {
    /// Chunk x coordinate (tile x / 8).
    pub x: i32,
    /// Chunk y coordinate (tile y / 8).
    pub y: i32,
    /// Height plane.
    pub plane: u8,
}

impl ChunkPosition {
    /// Create a chunk position.
    pub const fn new(x: i32, y: i32, plane: u8) -> Self {
        Self { x, y, plane }
    }

    /// The south-west tile of this chunk.
    pub const fn base(&self) -> Position {
        Position {
            x: self.x.saturating_mul(CHUNK_SIZE),
            y: self.y.saturating_mul(CHUNK_SIZE),
            plane: self.plane,
        }
    }
}

impl core::fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "chunk({}, {}, {})", self.x, self.y, self.plane)
    }
}
