//! Deterministic contender selection.
//!
//! When several binding spots request the same linker in one step, the
//! owner of the linker selects the winner with a hash:
//!
//! ```text
//! winner = argmax_{c ∈ contenders} H(target ‖ step ‖ c)
//! ```
//!
//! No arrival order, no rank id, no local counter enters the score, so
//! the result depends only on the set of contenders.

use linkage_binning::EntityId;
use tracing::trace;

use crate::BindingSpot;

/// What is being contended, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArbitrationKey {
    pub target: EntityId,
    pub step: u64,
}

impl ArbitrationKey {
    pub const fn new(target: EntityId, step: u64) -> Self {
        Self { target, step }
    }
}

/// Select the winning binding spot for a target.
///
/// Returns `None` only for an empty contender list. Duplicates do not
/// change the outcome.
pub fn select_winner(key: ArbitrationKey, contenders: &[BindingSpot]) -> Option<BindingSpot> {
    let winner = contenders
        .iter()
        .map(|c| (contender_score(key, c), *c))
        .max()?;
    trace!(
        linker = %key.target,
        step = key.step,
        winner = %winner.1,
        score = %hex::encode(&winner.0[..8]),
        contenders = contenders.len(),
        "arbitrated"
    );
    Some(winner.1)
}

/// Select which linker a free binding spot proposes to, among eligible ones.
///
/// Same construction as [`select_winner`] with the roles swapped, so every
/// rank holding a copy of the spot would pick the same linker.
pub fn select_candidate(spot: BindingSpot, step: u64, candidates: &[EntityId]) -> Option<EntityId> {
    candidates
        .iter()
        .map(|c| (candidate_score(spot, step, *c), *c))
        .max()
        .map(|(_, c)| c)
}

// H(target ‖ step ‖ contender)
fn contender_score(key: ArbitrationKey, contender: &BindingSpot) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"linkage/arbitrate");
    hasher.update(&key.target.0.to_le_bytes());
    hasher.update(&key.step.to_le_bytes());
    hasher.update(&contender.element.0.to_le_bytes());
    hasher.update(&contender.index.to_le_bytes());
    *hasher.finalize().as_bytes()
}

fn candidate_score(spot: BindingSpot, step: u64, candidate: EntityId) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"linkage/candidate");
    hasher.update(&spot.element.0.to_le_bytes());
    hasher.update(&spot.index.to_le_bytes());
    hasher.update(&step.to_le_bytes());
    hasher.update(&candidate.0.to_le_bytes());
    *hasher.finalize().as_bytes()
}
