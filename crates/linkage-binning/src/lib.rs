//! Linkage Binning
//!
//! Uniform axis-aligned bins over the simulation domain, used to find
//! interaction candidates without an all-pairs search.
//!
//! # Bin Neighborhoods
//!
//! Every bin has at most 27 bins in its neighborhood: itself and the 26
//! bins that share a face, edge or corner with it. Bins on the domain
//! boundary have fewer neighbors; the grid is not periodic.
//!
//! Two entities can only interact if their bins are in each other's
//! neighborhood, so the bin size must be at least the largest interaction
//! distance in the system.
//!
//! # Spatial Index
//!
//! [`SpatialIndex`] is the narrow interface the interaction layer consumes:
//! neighborhoods, content queries filtered by entity kind, and the bins an
//! entity currently occupies. [`BinningIndex`] is the uniform-grid
//! implementation used by the simulation driver and the tests.

mod coord;
mod error;
mod grid;
mod index;
mod neighbors;

pub use coord::BinCoord;
pub use error::{BinningError, Result};
pub use grid::{BinGrid, BinId};
pub use index::{BinContent, BinningIndex, EntityId, EntityKind, SpatialIndex};
pub use neighbors::{are_neighbors, Neighbors};

/// Bins adjacent to a bin (face, edge and corner neighbors).
pub const NEIGHBOR_BINS: usize = 26;

/// Size of a full neighborhood including the bin itself.
pub const NEIGHBORHOOD_SIZE: usize = 27;

const _: () = assert!(NEIGHBOR_BINS + 1 == NEIGHBORHOOD_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighborhood_invariant() {
        assert_eq!(Neighbors::DIRECTIONS.len(), NEIGHBOR_BINS);
        assert_eq!(NEIGHBOR_BINS + 1, NEIGHBORHOOD_SIZE);
    }
}
