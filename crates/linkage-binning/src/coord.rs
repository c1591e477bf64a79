//! Integer bin coordinates.

use std::ops::{Add, Neg, Sub};

/// Integer position of a bin in the grid.
///
/// Coordinates outside the grid are representable; [`crate::BinGrid`]
/// decides whether a coordinate maps to a bin id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinCoord {
    pub i: i64,
    pub j: i64,
    pub k: i64,
}

impl BinCoord {
    /// Origin of the coordinate system.
    pub const ORIGIN: Self = Self { i: 0, j: 0, k: 0 };

    /// Create a new coordinate.
    pub const fn new(i: i64, j: i64, k: i64) -> Self {
        Self { i, j, k }
    }

    /// Chebyshev distance: the number of neighborhood hops between bins.
    pub fn chebyshev(&self, other: &Self) -> u64 {
        let di = (self.i - other.i).unsigned_abs();
        let dj = (self.j - other.j).unsigned_abs();
        let dk = (self.k - other.k).unsigned_abs();
        di.max(dj).max(dk)
    }
}

impl Add for BinCoord {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            i: self.i + other.i,
            j: self.j + other.j,
            k: self.k + other.k,
        }
    }
}

impl Sub for BinCoord {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            i: self.i - other.i,
            j: self.j - other.j,
            k: self.k - other.k,
        }
    }
}

impl Neg for BinCoord {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            i: -self.i,
            j: -self.j,
            k: -self.k,
        }
    }
}

impl std::fmt::Display for BinCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}
