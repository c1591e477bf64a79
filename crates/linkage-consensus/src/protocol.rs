//! Request, arbitrate, dispatch.

use std::collections::BTreeMap;

use linkage_binning::EntityId;
use linkage_comm::{exchange, Communicator, Outbox, Rank, Tag};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::arbitration::{select_winner, ArbitrationKey};
use crate::error::Result;
use crate::BindingSpot;

/// A request to bind `contender` to `target`, sent to the target owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal<P> {
    /// Entity whose state the decision changes (the linker).
    pub target: EntityId,
    /// Rank that owns `target` and arbitrates.
    pub target_owner: Rank,
    /// Binding spot asking for the bond.
    pub contender: BindingSpot,
    /// Rank that owns `contender` and made the request.
    pub proposer: Rank,
    /// Data the owner needs to commit its side of the bond.
    pub payload: P,
}

/// Outcome of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Granted,
    Denied,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Granted => write!(f, "Granted"),
            Self::Denied => write!(f, "Denied"),
        }
    }
}

/// A proposal together with the owner's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision<P> {
    pub proposal: Proposal<P>,
    pub verdict: Verdict,
}

/// Owner-side check that a request still applies to the target.
///
/// Requests can be stale: built against a ghost copy that was already
/// superseded, or aimed at a target that no longer lives here.
pub trait Arbiter<P> {
    fn admits(&self, proposal: &Proposal<P>) -> bool;
}

impl<P, F> Arbiter<P> for F
where
    F: Fn(&Proposal<P>) -> bool,
{
    fn admits(&self, proposal: &Proposal<P>) -> bool {
        self(proposal)
    }
}

/// What a rank has to commit after a consensus round.
#[derive(Debug, Clone)]
pub struct Resolution<P> {
    /// Granted proposals for targets owned here. Commit the target side.
    pub granted_targets: Vec<Proposal<P>>,
    /// Verdicts for every proposal this rank made. Commit the contender
    /// side of the granted ones.
    pub own_decisions: Vec<Decision<P>>,
    /// Requests this rank rejected as stale while arbitrating.
    pub stale: usize,
}

/// Run one consensus round.
///
/// Every rank must call this once per step, with an empty list when it has
/// nothing to propose. Proposals whose target is owned locally never leave
/// the rank.
pub fn resolve<C, P, A>(comm: &C, step: u64, proposals: Vec<Proposal<P>>, arbiter: &A) -> Result<Resolution<P>>
where
    C: Communicator + ?Sized,
    P: Serialize + DeserializeOwned + Clone,
    A: Arbiter<P> + ?Sized,
{
    let me = comm.rank();

    // 1. route requests to target owners
    let mut requests: Outbox<Proposal<P>> = Outbox::new();
    for proposal in proposals {
        requests.entry(proposal.target_owner).or_default().push(proposal);
    }
    let incoming = exchange(comm, Tag::BindRequest, requests)?;

    // 2. arbitrate per target
    let mut by_target: BTreeMap<EntityId, Vec<Proposal<P>>> = BTreeMap::new();
    for (_, bundle) in incoming {
        for proposal in bundle {
            by_target.entry(proposal.target).or_default().push(proposal);
        }
    }

    let mut granted_targets = Vec::new();
    let mut replies: Outbox<Decision<P>> = Outbox::new();
    let mut stale = 0usize;
    for (target, mut requests) in by_target {
        requests.sort_by_key(|p| p.contender);
        requests.dedup_by_key(|p| p.contender);

        let (admitted, rejected): (Vec<_>, Vec<_>) =
            requests.into_iter().partition(|p| p.target_owner == me && arbiter.admits(p));
        for proposal in rejected {
            warn!(%me, linker = %target, contender = %proposal.contender, step, "discarding stale bind request");
            stale += 1;
            replies.entry(proposal.proposer).or_default().push(Decision {
                proposal,
                verdict: Verdict::Denied,
            });
        }

        let contenders: Vec<BindingSpot> = admitted.iter().map(|p| p.contender).collect();
        let Some(winner) = select_winner(ArbitrationKey::new(target, step), &contenders) else {
            continue;
        };
        for proposal in admitted {
            let verdict = if proposal.contender == winner {
                granted_targets.push(proposal.clone());
                Verdict::Granted
            } else {
                Verdict::Denied
            };
            replies.entry(proposal.proposer).or_default().push(Decision { proposal, verdict });
        }
    }

    // 3. dispatch verdicts back to proposers
    let mut own_decisions: Vec<Decision<P>> = exchange(comm, Tag::BindDecision, replies)?
        .into_iter()
        .flat_map(|(_, bundle)| bundle)
        .collect();
    own_decisions.sort_by_key(|d| (d.proposal.target, d.proposal.contender));

    debug!(
        %me,
        step,
        granted = granted_targets.len(),
        decisions = own_decisions.len(),
        stale,
        "consensus round complete"
    );

    Ok(Resolution {
        granted_targets,
        own_decisions,
        stale,
    })
}
