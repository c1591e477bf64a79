//! Events recorded by every rank during a run.

use std::collections::BTreeMap;

use linkage_comm::Rank;
use linkage_interaction::{EnergyType, StepReport, VisualizationFrame};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SimEvent {
    /// A rank finished a step.
    StepCompleted {
        step: u64,
        rank: Rank,
        rows: usize,
        ghosts: usize,
        report: StepReport,
        /// Energies summed over all ranks.
        energy: BTreeMap<EnergyType, f64>,
    },

    /// Contact points and bonds of one rank.
    Frame { frame: VisualizationFrame },
}

impl SimEvent {
    pub fn step(&self) -> u64 {
        match self {
            SimEvent::StepCompleted { step, .. } => *step,
            SimEvent::Frame { frame } => frame.step,
        }
    }

    pub fn rank(&self) -> Rank {
        match self {
            SimEvent::StepCompleted { rank, .. } => *rank,
            SimEvent::Frame { frame } => frame.rank,
        }
    }

    /// One line of the JSON event log.
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
