//! Map-region boundary checks.
//!
//! A client renders the 104x104 tile region around the last region base it
//! was sent. Once the player walks within 16 tiles of that region's edge
//! the server must send a new base, otherwise the client runs out of map.

use keystone_types::Position;

/// Lowest local coordinate that does not need a new region.
pub const REGION_MIN_LOCAL: i32 = 16;

/// First local coordinate on the north-east side that needs a new region.
pub const REGION_MAX_LOCAL: i32 = 88;

/// Whether a player at `position` needs a new region, given the base of the
/// last region it was sent.
///
/// A player that was never sent a region always needs one. Otherwise the
/// check is `local < 16 || local >= 88` on both axes, treating the upper
/// bound the same way on x and y.
pub const fn needs_region_update(position: &Position, last_region: Option<&Position>) -> bool {
    let Some(base) = last_region else {
        return true;
    };
    if position.plane != base.plane {
        return true;
    }
    let local_x = position.local_x(base);
    let local_y = position.local_y(base);
    local_x < REGION_MIN_LOCAL
        || local_x >= REGION_MAX_LOCAL
        || local_y < REGION_MIN_LOCAL
        || local_y >= REGION_MAX_LOCAL
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Base whose region starts at tile (3168, 3168).
    const BASE: Position = Position::new(3222, 3218, 0);

    fn at_local(local_x: i32, local_y: i32) -> Position {
        Position::new(3168 + local_x, 3168 + local_y, 0)
    }

    #[test]
    fn first_region_is_always_needed() {
        assert!(needs_region_update(&BASE, None));
    }

    #[test]
    fn standing_on_base_needs_nothing() {
        assert!(!needs_region_update(&BASE, Some(&BASE)));
    }

    #[test]
    fn lower_bound_is_exclusive_of_16() {
        assert!(!needs_region_update(&at_local(16, 50), Some(&BASE)));
        assert!(needs_region_update(&at_local(15, 50), Some(&BASE)));
        assert!(!needs_region_update(&at_local(50, 16), Some(&BASE)));
        assert!(needs_region_update(&at_local(50, 15), Some(&BASE)));
    }

    #[test]
    fn upper_bound_is_inclusive_of_88_on_both_axes() {
        assert!(!needs_region_update(&at_local(87, 50), Some(&BASE)));
        assert!(needs_region_update(&at_local(88, 50), Some(&BASE)));
        assert!(!needs_region_update(&at_local(50, 87), Some(&BASE)));
        assert!(needs_region_update(&at_local(50, 88), Some(&BASE)));
    }

    #[test]
    fn changing_plane_needs_region() {
        let upstairs = Position::new(BASE.x, BASE.y, 1);
        assert!(needs_region_update(&upstairs, Some(&BASE)));
    }
}
