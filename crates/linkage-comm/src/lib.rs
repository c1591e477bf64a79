//! Linkage Comm - message passing between ranks.
//!
//! Every rank runs the same sequence of phases. Inside a phase, a rank sends
//! tagged messages to the ranks it needs to talk to and then receives
//! exactly as many messages as were addressed to it.
//!
//! # Counted Exchange
//!
//! The receiver cannot know in advance how many ranks will write to it, so
//! each phase starts with a reduction:
//!
//! 1. Every rank fills a vector with a `1` at each destination it will send to
//! 2. The vectors are summed over all ranks
//! 3. Entry `r` of the sum is the number of messages rank `r` must receive
//! 4. Sends are posted, then the receiver drains exactly that many messages
//!
//! A receive that does not complete within [`ExchangeConfig::recv_timeout`]
//! is a fatal [`CommError::MessageCountMismatch`]: some rank sent a
//! different number of messages than the reduction announced.
//!
//! # Transports
//!
//! [`Communicator`] is the seam between the interaction layer and the
//! transport. [`LocalCluster`] connects ranks running as threads in one
//! process and is what the driver and the tests use.

mod communicator;
mod config;
mod envelope;
mod error;
mod exchange;
mod local;

pub use communicator::Communicator;
pub use config::ExchangeConfig;
pub use envelope::{decode, encode, Envelope, Tag};
pub use error::{CommError, Result};
pub use exchange::{exchange, Outbox};
pub use local::{LocalCluster, LocalComm};

use serde::{Deserialize, Serialize};

/// Index of a process in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Rank {
    /// Position of this rank in per-rank vectors.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rank {}", self.0)
    }
}
