//! Slab decomposition of the bin grid along x.
//!
//! Rank `r` owns the bin columns `[r * nx / R, (r + 1) * nx / R)`. An
//! entity belongs to the slab holding its reference point (beam midpoint,
//! center otherwise) and is ghosted on every rank whose slab, widened by
//! the halo, overlaps its x extent.

use linkage_binning::{BinGrid, BinningIndex};
use linkage_comm::Rank;
use linkage_interaction::{Entity, EntityTable, Shape};

use crate::scene::Scene;

#[derive(Debug, Clone, PartialEq)]
pub struct SlabDecomposition {
    lower_x: f64,
    bin_size: f64,
    columns: i64,
    ranks: usize,
    halo: f64,
}

impl SlabDecomposition {
    /// Slabs over `grid` for `ranks` ranks, ghosting up to `halo` beyond
    /// each slab.
    pub fn new(grid: &BinGrid, ranks: usize, halo: f64) -> Self {
        Self {
            lower_x: grid.origin().x,
            bin_size: grid.bin_size(),
            columns: grid.dims()[0],
            ranks: ranks.max(1),
            halo,
        }
    }

    pub fn ranks(&self) -> usize {
        self.ranks
    }

    fn first_column(&self, rank: usize) -> i64 {
        rank as i64 * self.columns / self.ranks as i64
    }

    fn column(&self, x: f64) -> i64 {
        (((x - self.lower_x) / self.bin_size).floor() as i64).clamp(0, self.columns - 1)
    }

    /// Owner of a reference point at `x`.
    pub fn owner_of_x(&self, x: f64) -> Rank {
        let column = self.column(x);
        let rank = (0..self.ranks)
            .find(|r| self.first_column(*r) <= column && column < self.first_column(r + 1))
            .unwrap_or(self.ranks - 1);
        Rank(rank as u32)
    }

    /// The x interval of a slab, empty when the rank has no columns.
    pub fn slab(&self, rank: Rank) -> (f64, f64) {
        let r = rank.index();
        (
            self.lower_x + self.first_column(r) as f64 * self.bin_size,
            self.lower_x + self.first_column(r + 1) as f64 * self.bin_size,
        )
    }

    /// Ranks whose widened slab overlaps `[x_min, x_max]`.
    pub fn holders(&self, x_min: f64, x_max: f64) -> Vec<Rank> {
        (0..self.ranks as u32)
            .map(Rank)
            .filter(|r| {
                let (lo, hi) = self.slab(*r);
                hi > lo && x_max >= lo - self.halo && x_min <= hi + self.halo
            })
            .collect()
    }

    /// Row entities and ghosts of `rank`.
    pub fn table_for(&self, rank: Rank, scene: &Scene) -> EntityTable {
        let mut table = EntityTable::new(rank);
        for (id, shape) in scene.iter() {
            let (reference, x_min, x_max) = match shape {
                Shape::Beam(b) => {
                    let (a, c) = (b.positions[0].x, b.positions[1].x);
                    (0.5 * (a + c), a.min(c), a.max(c))
                }
                other => {
                    let x = other.positions()[0].x;
                    (x, x, x)
                }
            };
            let owner = self.owner_of_x(reference);
            let holders = self.holders(x_min, x_max);
            if owner != rank && !holders.contains(&rank) {
                continue;
            }
            let ghost_holders = if owner == rank {
                holders.into_iter().filter(|r| *r != owner).collect()
            } else {
                Vec::new()
            };
            table.insert(Entity {
                id,
                owner,
                shape: shape.clone(),
                ghost_holders,
            });
        }
        table
    }
}

/// Spatial index over every entity of `table`: beams by their segment,
/// everything else by its center.
pub fn bin_entities(grid: &BinGrid, table: &EntityTable) -> linkage_binning::Result<BinningIndex> {
    let mut index = BinningIndex::new(grid.clone());
    for entity in table.iter() {
        match &entity.shape {
            Shape::Beam(b) => index.insert_segment(entity.id, entity.kind(), b.positions[0], b.positions[1])?,
            other => {
                index.insert_point(entity.id, entity.kind(), other.positions()[0])?;
            }
        }
    }
    Ok(index)
}
