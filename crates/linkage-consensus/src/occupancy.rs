//! Binding spots and the at-most-one-bond invariant.

use std::collections::BTreeMap;

use linkage_binning::EntityId;
use linkage_comm::Rank;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A binding site on a beam element: element id plus local spot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingSpot {
    pub element: EntityId,
    pub index: u16,
}

impl BindingSpot {
    pub const fn new(element: EntityId, index: u16) -> Self {
        Self { element, index }
    }
}

impl std::fmt::Display for BindingSpot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.element, self.index)
    }
}

/// Occupancy invariant violation. Always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OccupancyViolation {
    /// A commit tried to bind a spot that already holds a bond.
    #[error("{rank} step {step}: spot {spot} already held by {existing}, refusing {incoming}")]
    AlreadyOccupied {
        spot: BindingSpot,
        existing: EntityId,
        incoming: EntityId,
        rank: Rank,
        step: u64,
    },

    /// An unbind names a linker the spot does not hold.
    #[error("{rank} step {step}: unbind of {crosslinker} from {spot}, which holds {holder:?}")]
    UnbindMismatch {
        spot: BindingSpot,
        crosslinker: EntityId,
        holder: Option<EntityId>,
        rank: Rank,
        step: u64,
    },

    /// A granted bind reached a linker whose both ends are already bound.
    #[error("{rank} step {step}: {crosslinker} has no free end for {spot}")]
    NoFreeEnd {
        spot: BindingSpot,
        crosslinker: EntityId,
        rank: Rank,
        step: u64,
    },

    /// A spot names an occupant whose copy holds no bond back to it.
    #[error("{rank}: spot {spot} names {occupant}, which is not bound to it")]
    OrphanOccupant {
        spot: BindingSpot,
        occupant: EntityId,
        rank: Rank,
    },

    /// A consistency check found several bonds on one spot.
    #[error("spot {spot} holds {} bonds: {occupants:?}", .occupants.len())]
    MultipleOccupants {
        spot: BindingSpot,
        occupants: Vec<EntityId>,
    },
}

/// Check that no spot appears in more than one bond.
///
/// `bonds` lists every (spot, linker) bond known to the caller, for example
/// gathered from all ranks. A linker listed twice on the same spot is a
/// violation as well.
pub fn check_single_occupancy<I>(bonds: I) -> Result<(), OccupancyViolation>
where
    I: IntoIterator<Item = (BindingSpot, EntityId)>,
{
    let mut by_spot: BTreeMap<BindingSpot, Vec<EntityId>> = BTreeMap::new();
    for (spot, linker) in bonds {
        by_spot.entry(spot).or_default().push(linker);
    }
    match by_spot.into_iter().find(|(_, occupants)| occupants.len() > 1) {
        Some((spot, occupants)) => Err(OccupancyViolation::MultipleOccupants { spot, occupants }),
        None => Ok(()),
    }
}
