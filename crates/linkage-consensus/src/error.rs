//! Error types for linkage-consensus.

use linkage_comm::CommError;
use thiserror::Error;

use crate::OccupancyViolation;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Fatal consensus failures. Denied proposals are not errors.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Request or decision exchange failed.
    #[error(transparent)]
    Comm(#[from] CommError),

    /// Committing a decision would break single occupancy.
    #[error(transparent)]
    Occupancy(#[from] OccupancyViolation),
}
