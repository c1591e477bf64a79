//! Error types for linkage-history.

use linkage_comm::{CommError, Rank};
use thiserror::Error;

use crate::PairKey;

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors raised while moving or restoring history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Exchanging entries between ranks failed.
    #[error(transparent)]
    Comm(#[from] CommError),

    /// Restart data could not be encoded or decoded.
    #[error("restart codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// An incoming entry already exists locally; it would be duplicated.
    #[error("{rank} received history {key} from {from} but already owns it")]
    Duplicate { key: PairKey, rank: Rank, from: Rank },

    /// Restart data lists the same pair twice.
    #[error("restart data holds history {0} twice")]
    DuplicateRecord(PairKey),
}
