//! 26-bin neighborhood directions.

use crate::{BinCoord, NEIGHBOR_BINS};

/// Neighbor directions of a bin.
#[derive(Debug, Clone, Copy)]
pub struct Neighbors;

impl Neighbors {
    /// All 26 offsets with components in {-1, 0, 1}, excluding the origin.
    ///
    /// Ordered lexicographically by (i, j, k) so that neighborhood queries
    /// visit bins in the same order on every rank.
    pub const DIRECTIONS: [BinCoord; NEIGHBOR_BINS] = [
        BinCoord { i: -1, j: -1, k: -1 },
        BinCoord { i: -1, j: -1, k: 0 },
        BinCoord { i: -1, j: -1, k: 1 },
        BinCoord { i: -1, j: 0, k: -1 },
        BinCoord { i: -1, j: 0, k: 0 },
        BinCoord { i: -1, j: 0, k: 1 },
        BinCoord { i: -1, j: 1, k: -1 },
        BinCoord { i: -1, j: 1, k: 0 },
        BinCoord { i: -1, j: 1, k: 1 },
        BinCoord { i: 0, j: -1, k: -1 },
        BinCoord { i: 0, j: -1, k: 0 },
        BinCoord { i: 0, j: -1, k: 1 },
        BinCoord { i: 0, j: 0, k: -1 },
        BinCoord { i: 0, j: 0, k: 1 },
        BinCoord { i: 0, j: 1, k: -1 },
        BinCoord { i: 0, j: 1, k: 0 },
        BinCoord { i: 0, j: 1, k: 1 },
        BinCoord { i: 1, j: -1, k: -1 },
        BinCoord { i: 1, j: -1, k: 0 },
        BinCoord { i: 1, j: -1, k: 1 },
        BinCoord { i: 1, j: 0, k: -1 },
        BinCoord { i: 1, j: 0, k: 0 },
        BinCoord { i: 1, j: 0, k: 1 },
        BinCoord { i: 1, j: 1, k: -1 },
        BinCoord { i: 1, j: 1, k: 0 },
        BinCoord { i: 1, j: 1, k: 1 },
    ];

    /// All 26 neighbors of a coordinate, unclipped.
    pub fn of(coord: BinCoord) -> [BinCoord; NEIGHBOR_BINS] {
        Self::DIRECTIONS.map(|dir| coord + dir)
    }

    /// The coordinate itself followed by its 26 neighbors.
    pub fn with_self(coord: BinCoord) -> impl Iterator<Item = BinCoord> {
        std::iter::once(coord).chain(Self::of(coord))
    }
}

/// Check if two coordinates are distinct neighbors.
pub fn are_neighbors(a: BinCoord, b: BinCoord) -> bool {
    a.chebyshev(&b) == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exactly_26_unique_directions() {
        let set: HashSet<_> = Neighbors::DIRECTIONS.iter().collect();
        assert_eq!(set.len(), 26);
        assert!(!set.contains(&BinCoord::ORIGIN));
    }

    #[test]
    fn directions_are_sorted() {
        let mut sorted = Neighbors::DIRECTIONS;
        sorted.sort();
        assert_eq!(sorted, Neighbors::DIRECTIONS);
    }

    #[test]
    fn neighbors_are_symmetric() {
        let c = BinCoord::new(4, -2, 9);
        for n in Neighbors::of(c) {
            assert!(are_neighbors(c, n));
            assert!(Neighbors::of(n).contains(&c));
        }
    }

    #[test]
    fn self_is_not_a_neighbor() {
        let c = BinCoord::new(1, 1, 1);
        assert!(!are_neighbors(c, c));
        assert_eq!(Neighbors::with_self(c).count(), 27);
    }
}
