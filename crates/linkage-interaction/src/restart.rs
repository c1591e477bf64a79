//! Restart records.
//!
//! Every rank writes one chunk with the state it owns. Records carry
//! global ids only, so any number of ranks can read the chunks back: each
//! keeps what it owns and what it sees as ghosts.

use glam::{DMat3, DVec3};
use linkage_binning::EntityId;
use linkage_consensus::BindingSpot;
use linkage_history::{HistoryRecord, PairKey};
use serde::{Deserialize, Serialize};

use crate::catalog::PairKind;
use crate::crosslinking::{Bond, CrosslinkerState};
use crate::dem::DemHistory;
use crate::entity::{EntityTable, LinkerType};
use crate::error::Result;
use crate::pair::{BeamLink, ContactState};

/// History-carrying pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub entity_a: EntityId,
    pub entity_b: EntityId,
    pub pair_kind: PairKind,
    /// Active if the pair was in contact during the last step.
    pub state: ContactState,
    pub history: Vec<f64>,
}

impl PairRecord {
    pub fn from_history(record: &HistoryRecord<DemHistory>) -> Self {
        Self {
            entity_a: record.key.primary(),
            entity_b: record.key.secondary(),
            pair_kind: PairKind::ParticleParticle,
            state: if record.touched {
                ContactState::Active
            } else {
                ContactState::Inactive
            },
            history: record.value.to_values(),
        }
    }

    pub fn to_history(&self) -> Option<HistoryRecord<DemHistory>> {
        Some(HistoryRecord {
            key: PairKey::new(self.entity_a, self.entity_b),
            touched: self.state == ContactState::Active,
            value: DemHistory::from_values(&self.history)?,
        })
    }
}

/// Bond state of one crosslinker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosslinkerRecord {
    pub crosslinker: EntityId,
    pub linker: LinkerType,
    pub bonded_spots: [Option<BindingSpot>; 2],
    pub step_bound: [u64; 2],
    pub spot_xi: [f64; 2],
    pub position: DVec3,
    /// Column-major frame, first axis along the link.
    pub orientation: [f64; 9],
    /// Reference length of the link, zero unless double-bonded.
    pub reference_length: f64,
    pub link_created: u64,
}

impl CrosslinkerRecord {
    pub fn new(state: &CrosslinkerState, link: Option<&BeamLink>) -> Self {
        let mut bonded_spots = [None; 2];
        let mut step_bound = [0; 2];
        let mut spot_xi = [0.0; 2];
        for (k, bond) in state.bonds.iter().enumerate() {
            if let Some(bond) = bond {
                bonded_spots[k] = Some(bond.spot);
                step_bound[k] = bond.step_bound;
                spot_xi[k] = bond.xi;
            }
        }
        let orientation = match &state.bonds {
            [Some(a), Some(b)] => frame_along(b.position - a.position),
            _ => DMat3::IDENTITY,
        };
        Self {
            crosslinker: state.id,
            linker: state.linker,
            bonded_spots,
            step_bound,
            spot_xi,
            position: state.position,
            orientation: orientation.to_cols_array(),
            reference_length: link.map_or(0.0, |l| l.reference_length),
            link_created: link.map_or(0, |l| l.created_step),
        }
    }

    /// Linker state with bond geometry taken from the visible beams.
    pub(crate) fn to_state(&self, table: &EntityTable) -> CrosslinkerState {
        let mut state = CrosslinkerState::new(self.crosslinker, self.linker, self.position);
        for (k, spot) in self.bonded_spots.iter().enumerate() {
            let Some(spot) = spot else { continue };
            let (position, tangent) = table.beam(spot.element).map_or((self.position, DVec3::ZERO), |beam| {
                (beam.point_at(self.spot_xi[k]), beam.tangent())
            });
            state.bonds[k] = Some(Bond {
                spot: *spot,
                step_bound: self.step_bound[k],
                xi: self.spot_xi[k],
                position,
                tangent,
            });
        }
        state
    }
}

fn frame_along(direction: DVec3) -> DMat3 {
    match direction.try_normalize() {
        Some(e1) => {
            let (e2, e3) = e1.any_orthonormal_pair();
            DMat3::from_cols(e1, e2, e3)
        }
        None => DMat3::IDENTITY,
    }
}

/// Everything one rank writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartChunk {
    pub step: u64,
    pub crosslinkers: Vec<CrosslinkerRecord>,
    pub pairs: Vec<PairRecord>,
}

impl RestartChunk {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
