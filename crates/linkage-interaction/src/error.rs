//! Error types for the interaction layer.

use linkage_binning::{BinningError, EntityId, EntityKind};
use linkage_comm::{CommError, Rank};
use linkage_consensus::{ConsensusError, OccupancyViolation};
use linkage_history::HistoryError;
use thiserror::Error;

use crate::manager::Phase;

/// Result type for interaction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors of the interaction layer.
///
/// Recoverable conditions (degenerate pair geometry, stale bind requests,
/// empty neighborhoods) are handled locally and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// An owned entity has no bin in the spatial index.
    #[error("stale spatial index: {kind} {entity} owned by {rank} has no bin")]
    StaleIndex {
        entity: EntityId,
        kind: EntityKind,
        rank: Rank,
    },

    /// A bonded pair was evaluated but its bond is not committed.
    #[error("{rank} step {step}: link of {crosslinker} evaluated without committed bonds")]
    Uncommitted {
        crosslinker: EntityId,
        rank: Rank,
        step: u64,
    },

    /// Manager operations were called out of order.
    #[error("{operation} is not allowed in phase {phase}")]
    PhaseOrder {
        operation: &'static str,
        phase: Phase,
    },

    /// An entity referenced by interaction state is unknown on this rank.
    #[error("{rank}: unknown {kind} {entity}")]
    UnknownEntity {
        entity: EntityId,
        kind: EntityKind,
        rank: Rank,
    },

    /// Parameter validation failed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Restart chunks decode but do not describe one consistent state.
    #[error("corrupt restart data: {0}")]
    CorruptRestart(String),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Occupancy(#[from] OccupancyViolation),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Binning(#[from] BinningError),

    /// Restart data could not be encoded or decoded.
    #[error("restart codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Parameter or output JSON could not be processed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
