//! Tagged message envelopes and payload codec.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::Result;
use crate::Rank;

/// Phase a message belongs to.
///
/// Receives match on the tag, so messages of a later phase that arrive
/// early are parked until that phase asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// Contribution to a collective reduction.
    Reduce,
    /// Bind proposals routed to the target owner.
    BindRequest,
    /// Grant/deny verdicts routed back to proposers.
    BindDecision,
    /// Unbinding notices routed to binding-spot owners.
    UnbindEvent,
    /// Owner state pushed to ghost holders.
    GhostRefresh,
    /// Row state handed to a new owner after repartitioning.
    StateMigration,
    /// History entries handed to the new owner of their primary entity.
    HistoryMigration,
    /// Read-only history copies for ghost holders.
    HistoryGhost,
    /// Loads assembled on ghosts, routed to their owners.
    GhostForce,
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tag::Reduce => "reduce",
            Tag::BindRequest => "bind-request",
            Tag::BindDecision => "bind-decision",
            Tag::UnbindEvent => "unbind-event",
            Tag::GhostRefresh => "ghost-refresh",
            Tag::StateMigration => "state-migration",
            Tag::HistoryMigration => "history-migration",
            Tag::HistoryGhost => "history-ghost",
            Tag::GhostForce => "ghost-force",
        };
        f.write_str(name)
    }
}

/// A message in flight between two ranks.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: Rank,
    pub tag: Tag,
    pub payload: Vec<u8>,
}

/// Serialize a payload.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Deserialize a payload.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_preserves_nested_payloads() {
        let payload: Vec<(u64, Option<f64>)> = vec![(1, Some(0.5)), (2, None)];
        let bytes = encode(&payload).unwrap();
        let back: Vec<(u64, Option<f64>)> = decode(&bytes).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let bytes = encode(&vec![1u64, 2, 3]).unwrap();
        assert!(decode::<Vec<u64>>(&bytes[..bytes.len() - 2]).is_err());
    }
}
