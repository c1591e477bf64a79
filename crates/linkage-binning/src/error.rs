//! Error types for linkage-binning.

use glam::DVec3;
use thiserror::Error;

use crate::EntityId;

/// Result type for binning operations.
pub type Result<T> = std::result::Result<T, BinningError>;

/// Errors raised while building a grid or filling an index.
#[derive(Debug, Error)]
pub enum BinningError {
    /// Bin size must be positive and finite.
    #[error("invalid bin size {0}")]
    InvalidBinSize(f64),

    /// Domain extent must be positive in every direction.
    #[error("invalid domain extent {0}")]
    InvalidExtent(DVec3),

    /// An entity was placed outside the binned domain.
    #[error("entity {entity} at {position} lies outside the binned domain")]
    OutsideDomain { entity: EntityId, position: DVec3 },
}
