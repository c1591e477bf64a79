//! Moving history between ranks.

use std::collections::{BTreeMap, BTreeSet};

use linkage_binning::EntityId;
use linkage_comm::{exchange, Communicator, Outbox, Rank, Tag};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{HistoryError, Result};
use crate::{HistoryPairStore, PairKey, Touched};

/// What a redistribution moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Entries handed to other ranks.
    pub sent: usize,
    /// Entries taken over from other ranks.
    pub received: usize,
    /// Entries whose primary entity has no known owner any more.
    pub dropped: usize,
}

/// Hand every entry whose primary entity is now owned elsewhere to its new
/// owner, and take over entries sent here.
///
/// `owner_of` reflects ownership *after* repartitioning. Must be called on
/// every rank in the same phase.
pub fn distribute_history_pairs<C, T, F>(
    store: &mut HistoryPairStore<T>,
    comm: &C,
    owner_of: F,
) -> Result<MigrationSummary>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned,
    F: Fn(EntityId) -> Option<Rank>,
{
    let me = comm.rank();
    let mut summary = MigrationSummary::default();

    let leaving = store.drain_where(|key| owner_of(key.primary()) != Some(me));
    let mut outbox: Outbox<(PairKey, Touched<T>)> = Outbox::new();
    for (key, entry) in leaving {
        match owner_of(key.primary()) {
            Some(owner) => outbox.entry(owner).or_default().push((key, entry)),
            None => {
                warn!(%me, %key, "dropping history of entity without owner");
                summary.dropped += 1;
            }
        }
    }
    summary.sent = outbox.values().map(Vec::len).sum();

    for (from, bundle) in exchange(comm, Tag::HistoryMigration, outbox)? {
        for (key, entry) in bundle {
            if store.insert_raw(key, entry).is_some() {
                return Err(HistoryError::Duplicate { key, rank: me, from });
            }
            summary.received += 1;
        }
    }

    debug!(%me, sent = summary.sent, received = summary.received, "history pairs distributed");
    Ok(summary)
}

/// Refresh read-only copies of history on ranks that hold a ghost of either
/// entity of a pair. Previous copies are discarded.
///
/// Returns the number of copies received.
pub fn communicate_history_pairs<C, T, F>(
    store: &mut HistoryPairStore<T>,
    comm: &C,
    ghost_holders: F,
) -> Result<usize>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned + Clone,
    F: Fn(EntityId) -> Vec<Rank>,
{
    let me = comm.rank();
    let mut outbox: Outbox<(PairKey, T)> = Outbox::new();
    for (key, entry) in store.raw_entries() {
        let targets: BTreeSet<Rank> = ghost_holders(key.primary())
            .into_iter()
            .chain(ghost_holders(key.secondary()))
            .filter(|r| *r != me)
            .collect();
        for target in targets {
            outbox.entry(target).or_default().push((*key, entry.value.clone()));
        }
    }

    let ghosts: BTreeMap<PairKey, T> = exchange(comm, Tag::HistoryGhost, outbox)?
        .into_iter()
        .flat_map(|(_, bundle)| bundle)
        .collect();
    let count = ghosts.len();
    store.replace_ghosts(ghosts);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkage_comm::{ExchangeConfig, LocalCluster};
    use std::thread;

    #[test]
    fn single_rank_keeps_owned_entries() {
        let comm = LocalCluster::new(1, ExchangeConfig::fast()).unwrap().remove(0);
        let mut store: HistoryPairStore<u32> = HistoryPairStore::new();
        store.insert(PairKey::new(EntityId(1), EntityId(2)), 5);
        let summary = distribute_history_pairs(&mut store, &comm, |_| Some(Rank(0))).unwrap();
        assert_eq!(summary, MigrationSummary::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_owner_drops_entry() {
        let comm = LocalCluster::new(1, ExchangeConfig::fast()).unwrap().remove(0);
        let mut store: HistoryPairStore<u32> = HistoryPairStore::new();
        store.insert(PairKey::new(EntityId(1), EntityId(2)), 5);
        let summary = distribute_history_pairs(&mut store, &comm, |_| None).unwrap();
        assert_eq!(summary.dropped, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn entry_follows_primary_entity() {
        // Entity 1 moves from rank 0 to rank 1; entity 3 stays on rank 0.
        let comms = LocalCluster::new(2, ExchangeConfig::fast()).unwrap();
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mut store: HistoryPairStore<u32> = HistoryPairStore::new();
                    if comm.rank() == Rank(0) {
                        store.insert(PairKey::new(EntityId(1), EntityId(2)), 11);
                        store.insert(PairKey::new(EntityId(3), EntityId(4)), 33);
                    }
                    let owner = |e: EntityId| Some(if e == EntityId(1) { Rank(1) } else { Rank(0) });
                    distribute_history_pairs(&mut store, &comm, owner).unwrap();

                    // Rank 0 ghosts entity 2, so it gets a read copy of (1, 2).
                    let holders = |e: EntityId| if e == EntityId(2) { vec![Rank(0)] } else { Vec::new() };
                    let copies = communicate_history_pairs(&mut store, &comm, holders).unwrap();
                    (store.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(), copies, store)
                })
            })
            .collect();
        let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let (owned1, copies1, _) = results.pop().unwrap();
        let (owned0, copies0, store0) = results.pop().unwrap();

        assert_eq!(owned0, vec![(PairKey::new(EntityId(3), EntityId(4)), 33)]);
        assert_eq!(owned1, vec![(PairKey::new(EntityId(1), EntityId(2)), 11)]);
        assert_eq!(copies0, 1);
        assert_eq!(copies1, 0);
        assert_eq!(store0.ghost(&PairKey::new(EntityId(1), EntityId(2))), Some(&11));
    }
}
