//! Error types for the simulation driver.

use linkage_binning::BinningError;
use linkage_comm::{CommError, Rank};
use thiserror::Error;

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Interaction(#[from] linkage_interaction::Error),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Binning(#[from] BinningError),

    #[error("{0} panicked")]
    RankPanicked(Rank),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
