//! Uniform bin grid over an axis-aligned box.

use glam::DVec3;

use crate::error::{BinningError, Result};
use crate::{BinCoord, Neighbors};

/// Linear bin identifier, `i + nx * (j + ny * k)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinId(pub u64);

impl std::fmt::Display for BinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bin#{}", self.0)
    }
}

/// A non-periodic grid of cubic bins.
///
/// The binned domain is `[origin, origin + dims * bin_size]`; positions on
/// the upper faces belong to the last bin in that direction.
#[derive(Debug, Clone, PartialEq)]
pub struct BinGrid {
    origin: DVec3,
    bin_size: f64,
    dims: [i64; 3],
}

impl BinGrid {
    /// Cover `extent` starting at `origin` with bins of edge `bin_size`.
    ///
    /// The bin count per direction is rounded up, so the binned domain may
    /// be slightly larger than `extent`.
    pub fn new(origin: DVec3, extent: DVec3, bin_size: f64) -> Result<Self> {
        if !(bin_size.is_finite() && bin_size > 0.0) {
            return Err(BinningError::InvalidBinSize(bin_size));
        }
        if !(extent.is_finite() && extent.min_element() > 0.0) {
            return Err(BinningError::InvalidExtent(extent));
        }
        let count = |len: f64| ((len / bin_size).ceil() as i64).max(1);
        Ok(Self {
            origin,
            bin_size,
            dims: [count(extent.x), count(extent.y), count(extent.z)],
        })
    }

    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    /// Number of bins per direction.
    pub fn dims(&self) -> [i64; 3] {
        self.dims
    }

    /// Upper corner of the binned domain.
    pub fn upper(&self) -> DVec3 {
        self.origin
            + DVec3::new(
                self.dims[0] as f64,
                self.dims[1] as f64,
                self.dims[2] as f64,
            ) * self.bin_size
    }

    /// Total number of bins.
    pub fn bin_count(&self) -> u64 {
        (self.dims[0] * self.dims[1] * self.dims[2]) as u64
    }

    /// Whether a coordinate lies inside the grid.
    pub fn contains(&self, coord: BinCoord) -> bool {
        (0..self.dims[0]).contains(&coord.i)
            && (0..self.dims[1]).contains(&coord.j)
            && (0..self.dims[2]).contains(&coord.k)
    }

    /// Whether a position lies inside the binned domain.
    pub fn contains_position(&self, position: DVec3) -> bool {
        self.coord_of_position(position).is_some()
    }

    /// Bin coordinate of a position, `None` outside the domain.
    pub fn coord_of_position(&self, position: DVec3) -> Option<BinCoord> {
        let rel = (position - self.origin) / self.bin_size;
        let axis = |x: f64, n: i64| -> Option<i64> {
            if !(0.0..=n as f64).contains(&x) {
                return None;
            }
            Some((x.floor() as i64).min(n - 1))
        };
        Some(BinCoord::new(
            axis(rel.x, self.dims[0])?,
            axis(rel.y, self.dims[1])?,
            axis(rel.z, self.dims[2])?,
        ))
    }

    /// Linear id of a coordinate, `None` outside the grid.
    pub fn id_of(&self, coord: BinCoord) -> Option<BinId> {
        if !self.contains(coord) {
            return None;
        }
        let [nx, ny, _] = self.dims;
        Some(BinId((coord.i + nx * (coord.j + ny * coord.k)) as u64))
    }

    /// Coordinate of a linear id, `None` for ids past the last bin.
    pub fn coord_of(&self, id: BinId) -> Option<BinCoord> {
        if id.0 >= self.bin_count() {
            return None;
        }
        let [nx, ny, _] = self.dims;
        let raw = id.0 as i64;
        Some(BinCoord::new(raw % nx, (raw / nx) % ny, raw / (nx * ny)))
    }

    /// Bin containing a position.
    pub fn bin_of(&self, position: DVec3) -> Option<BinId> {
        self.coord_of_position(position).and_then(|c| self.id_of(c))
    }

    /// Geometric center of a bin.
    pub fn center_of(&self, id: BinId) -> Option<DVec3> {
        let c = self.coord_of(id)?;
        Some(
            self.origin
                + (DVec3::new(c.i as f64, c.j as f64, c.k as f64) + DVec3::splat(0.5))
                    * self.bin_size,
        )
    }

    /// The bin itself and its neighbors that exist in the grid, sorted by id.
    pub fn neighbor_and_own(&self, id: BinId) -> Vec<BinId> {
        let Some(coord) = self.coord_of(id) else {
            return Vec::new();
        };
        let mut ids: Vec<BinId> = Neighbors::with_self(coord)
            .filter_map(|c| self.id_of(c))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Bins touched by the straight segment `a -> b`, sorted and deduplicated.
    ///
    /// The segment is sampled at half the bin size, which cannot skip a bin
    /// the segment passes through by more than a corner graze. Samples
    /// outside the domain are ignored.
    pub fn bins_along_segment(&self, a: DVec3, b: DVec3) -> Vec<BinId> {
        let length = a.distance(b);
        let samples = ((2.0 * length / self.bin_size).ceil() as usize).max(1);
        let mut ids: Vec<BinId> = (0..=samples)
            .filter_map(|s| self.bin_of(a.lerp(b, s as f64 / samples as f64)))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
