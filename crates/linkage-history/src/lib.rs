//! Linkage History Pairs
//!
//! Contact laws with memory (tangential spring, rolling resistance,
//! adhesion) need state that lives as long as two entities stay in
//! contact. This crate keeps that state keyed by the pair of global ids.
//!
//! # Touched / Untouched
//!
//! Entries carry a touched flag. Evaluating a pair touches its entry; after
//! a step [`HistoryPairStore::update_history_pairs`] drops everything that
//! was not touched and clears the flag on the rest. A pair that separates
//! therefore loses its history after exactly one step.
//!
//! # Ownership
//!
//! The smaller id of a pair is its *primary* entity. The rank that owns the
//! primary entity owns the entry. When repartitioning moves the primary
//! entity, [`distribute_history_pairs`] moves the entry with it: removed at
//! the source, inserted at the destination, never both.

mod error;
mod key;
mod migration;
mod restart;
mod store;

pub use error::{HistoryError, Result};
pub use key::PairKey;
pub use migration::{communicate_history_pairs, distribute_history_pairs, MigrationSummary};
pub use restart::HistoryRecord;
pub use store::{HistoryPairStore, Touched};
