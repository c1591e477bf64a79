//! Interaction pairs evaluated by the manager.

mod contact;
mod link;

pub use contact::{BeamContactPair, ContactGeometry, ContactState, Penalty};
pub use link::BeamLink;

use linkage_binning::EntityId;
use thiserror::Error;

use crate::assembly::{EvaluationMode, PairEvaluation};
use crate::geometry::{GeometryCache, GeometryError};

/// Why a pair could not be evaluated this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PairError {
    /// No unique closest point; the pair is skipped this step.
    #[error("degenerate pair geometry: {0}")]
    Degenerate(#[from] GeometryError),

    /// An entity of the pair is not visible on this rank.
    #[error("no geometry for {0}")]
    MissingGeometry(EntityId),
}

/// A pair the manager evaluates.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionPair {
    BeamContact(BeamContactPair),
    BeamLink(BeamLink),
}

impl InteractionPair {
    /// Entities receiving the two force vectors.
    pub fn ids(&self) -> [EntityId; 2] {
        match self {
            Self::BeamContact(p) => p.ids(),
            Self::BeamLink(l) => l.elements(),
        }
    }

    pub fn reset_state(&mut self) {
        match self {
            Self::BeamContact(p) => p.reset_state(),
            Self::BeamLink(l) => l.reset_state(),
        }
    }

    pub fn pre_evaluate(&mut self, cache: &GeometryCache) -> Result<(), PairError> {
        match self {
            Self::BeamContact(p) => p.pre_evaluate(cache),
            Self::BeamLink(l) => l.pre_evaluate(cache),
        }
    }

    pub fn evaluate(&self, mode: EvaluationMode) -> PairEvaluation {
        match self {
            Self::BeamContact(p) => p.evaluate(mode),
            Self::BeamLink(l) => l.evaluate(mode),
        }
    }

    pub fn energy(&self) -> f64 {
        match self {
            Self::BeamContact(p) => p.energy(),
            Self::BeamLink(l) => l.energy(),
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::BeamContact(p) => p.state() == ContactState::Active,
            Self::BeamLink(l) => l.positions().is_some(),
        }
    }
}
