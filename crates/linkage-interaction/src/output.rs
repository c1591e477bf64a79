//! Visualization frames of contact points and bonds.

use glam::DVec3;
use linkage_binning::EntityId;
use linkage_comm::Rank;
use linkage_consensus::BindingSpot;
use serde::{Deserialize, Serialize};

use crate::catalog::PairKind;
use crate::crosslinking::BondState;
use crate::error::Result;

/// An active contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub pair: [EntityId; 2],
    pub kind: PairKind,
    /// Midpoint of the two closest points.
    pub position: DVec3,
    /// Force on the first entity.
    pub force: DVec3,
    pub gap: f64,
}

/// A double-bonded linker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondPoint {
    pub crosslinker: EntityId,
    pub spots: [BindingSpot; 2],
    pub positions: [DVec3; 2],
    /// Axial force, positive in tension.
    pub force: f64,
}

/// A row crosslinker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosslinkerPoint {
    pub id: EntityId,
    pub position: DVec3,
    pub state: BondState,
}

/// Output of one rank at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationFrame {
    pub step: u64,
    pub rank: Rank,
    pub contact_points: Vec<ContactPoint>,
    pub bonds: Vec<BondPoint>,
    pub crosslinkers: Vec<CrosslinkerPoint>,
}

impl VisualizationFrame {
    pub fn new(step: u64, rank: Rank) -> Self {
        Self {
            step,
            rank,
            contact_points: Vec::new(),
            bonds: Vec::new(),
            crosslinkers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contact_points.is_empty() && self.bonds.is_empty() && self.crosslinkers.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
