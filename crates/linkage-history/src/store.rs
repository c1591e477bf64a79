//! History pair store.

use std::collections::BTreeMap;

use linkage_binning::EntityId;
use serde::{Deserialize, Serialize};

use crate::PairKey;

/// A history value and whether it was used in the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touched<T> {
    pub touched: bool,
    pub value: T,
}

/// Owned history entries plus read-only copies received from other ranks.
#[derive(Debug, Clone)]
pub struct HistoryPairStore<T> {
    /// Entries whose primary entity is owned here.
    entries: BTreeMap<PairKey, Touched<T>>,
    /// Copies of entries owned elsewhere, refreshed by
    /// [`crate::communicate_history_pairs`].
    ghosts: BTreeMap<PairKey, T>,
}

impl<T> Default for HistoryPairStore<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            ghosts: BTreeMap::new(),
        }
    }
}

impl<T> HistoryPairStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an owned entry.
    pub fn get(&self, key: &PairKey) -> Option<&T> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Get an owned entry, else a ghost copy.
    pub fn get_any(&self, key: &PairKey) -> Option<&T> {
        self.get(key).or_else(|| self.ghosts.get(key))
    }

    /// Touch an entry, creating it with `init` if absent.
    pub fn get_or_insert_with<F>(&mut self, key: PairKey, init: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        let entry = self.entries.entry(key).or_insert_with(|| Touched {
            touched: false,
            value: init(),
        });
        entry.touched = true;
        &mut entry.value
    }

    /// Touch an existing entry. Returns false if there is none.
    pub fn touch(&mut self, key: &PairKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touched = true;
                true
            }
            None => false,
        }
    }

    /// Whether an entry was touched in the current step.
    pub fn is_touched(&self, key: &PairKey) -> bool {
        self.entries.get(key).is_some_and(|e| e.touched)
    }

    /// Insert or replace an entry, marked touched.
    pub fn insert(&mut self, key: PairKey, value: T) -> Option<T> {
        self.entries
            .insert(key, Touched { touched: true, value })
            .map(|e| e.value)
    }

    /// Insert an entry with an explicit flag.
    pub(crate) fn insert_raw(&mut self, key: PairKey, entry: Touched<T>) -> Option<Touched<T>> {
        self.entries.insert(key, entry)
    }

    pub fn remove(&mut self, key: &PairKey) -> Option<T> {
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Clear every touched flag.
    pub fn mark_all_untouched(&mut self) {
        for entry in self.entries.values_mut() {
            entry.touched = false;
        }
    }

    /// Drop untouched entries; returns how many were dropped.
    pub fn erase_untouched(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.touched);
        before - self.entries.len()
    }

    /// End-of-step maintenance: drop what was not used, then reset flags
    /// for the next step. Returns the number of dropped entries.
    pub fn update_history_pairs(&mut self) -> usize {
        let erased = self.erase_untouched();
        self.mark_all_untouched();
        erased
    }

    /// Number of owned entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate owned entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, &T)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }

    /// Owned entries with a given primary entity.
    pub fn entries_of(&self, primary: EntityId) -> impl Iterator<Item = (&PairKey, &T)> {
        self.iter().filter(move |(k, _)| k.primary() == primary)
    }

    /// Remove and return all owned entries matching `pred`.
    pub(crate) fn drain_where<F>(&mut self, mut pred: F) -> Vec<(PairKey, Touched<T>)>
    where
        F: FnMut(&PairKey) -> bool,
    {
        let keys: Vec<PairKey> = self.entries.keys().filter(|k| pred(k)).copied().collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|e| (k, e)))
            .collect()
    }

    pub(crate) fn raw_entries(&self) -> impl Iterator<Item = (&PairKey, &Touched<T>)> {
        self.entries.iter()
    }

    /// Read-only copy of an entry owned elsewhere.
    pub fn ghost(&self, key: &PairKey) -> Option<&T> {
        self.ghosts.get(key)
    }

    pub fn ghost_len(&self) -> usize {
        self.ghosts.len()
    }

    pub(crate) fn replace_ghosts(&mut self, ghosts: BTreeMap<PairKey, T>) {
        self.ghosts = ghosts;
    }

    /// Drop all owned entries and ghost copies.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ghosts.clear();
    }
}
