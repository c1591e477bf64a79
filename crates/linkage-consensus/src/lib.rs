//! Ownership Consensus for Bind Decisions
//!
//! A crosslinker can be reached by binding spots owned by several ranks.
//! Every one of them may want to bind it in the same step, but only one
//! bond may form. No rank decides alone about state it does not own.
//!
//! # Core Insight
//!
//! The rank that owns the *target* (the crosslinker) is the only one allowed
//! to decide about it. Proposers never commit speculatively; they wait for
//! the verdict.
//!
//! # Protocol
//!
//! 1. Proposers send bind requests to the target owner
//! 2. The owner arbitrates per target: a single request is granted, several
//!    requests are resolved by a hash of (target, step, contender)
//! 3. The owner returns a verdict to every proposer
//! 4. Both sides commit their half of the bond independently
//!
//! The hash never sees arrival order, rank ids or rank-local counters, so
//! the same inputs pick the same winner on any number of ranks.
//!
//! # Rates
//!
//! Binding and unbinding are Poisson processes; [`rates`] turns rates into
//! per-step probabilities, including Bell's force-dependent unbinding.

mod arbitration;
mod draw;
mod error;
mod occupancy;
mod protocol;
pub mod rates;

pub use arbitration::{select_candidate, select_winner, ArbitrationKey};
pub use draw::{seed_for, uniform_draw, DrawStream};
pub use error::{ConsensusError, Result};
pub use occupancy::{check_single_occupancy, BindingSpot, OccupancyViolation};
pub use protocol::{resolve, Arbiter, Decision, Proposal, Resolution, Verdict};

#[cfg(test)]
mod tests {
    use super::rates::*;

    #[test]
    fn bell_reduces_to_plain_rate_without_force() {
        let p0 = unbinding_probability(2.0, 0.01);
        let p = bell_unbinding_probability(2.0, 0.0, 1e-3, 4.1e-3, 0.01);
        assert!((p - p0).abs() < 1e-15);
    }
}
