//! Error types for linkage-comm.

use std::time::Duration;

use thiserror::Error;

use crate::{Rank, Tag};

/// Result type for communication operations.
pub type Result<T> = std::result::Result<T, CommError>;

/// Errors that can occur while exchanging messages.
///
/// All of them are fatal for the step in progress: ranks can no longer be
/// assumed to agree on shared state.
#[derive(Debug, Error)]
pub enum CommError {
    /// Fewer messages arrived than the count reduction announced.
    #[error("{rank} expected {expected} {tag} messages but received {received} within {timeout:?}")]
    MessageCountMismatch {
        rank: Rank,
        tag: Tag,
        expected: u64,
        received: u64,
        timeout: Duration,
    },

    /// A reduction partner did not contribute in time.
    #[error("{rank} timed out waiting for {peer} in reduction")]
    ReductionTimeout { rank: Rank, peer: Rank },

    /// Reduction inputs differ in length between ranks.
    #[error("reduction length mismatch: local {local}, from {peer} {remote}")]
    ReductionLength { peer: Rank, local: usize, remote: usize },

    /// Destination outside the cluster.
    #[error("unknown destination {to} in a cluster of {size}")]
    UnknownRank { to: Rank, size: usize },

    /// The destination's mailbox is gone.
    #[error("{0} disconnected")]
    Disconnected(Rank),

    /// The local mailbox lock was poisoned by a panicking thread.
    #[error("mailbox of {0} poisoned")]
    Poisoned(Rank),

    /// Payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The per-rank runtime could not be started.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
