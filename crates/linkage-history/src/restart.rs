//! Restart serialization.
//!
//! Records are keyed by global ids only, so a restart written by N ranks
//! can be read by M ranks: every rank decodes all chunks and keeps the
//! entries whose primary entity it owns.

use linkage_binning::EntityId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{HistoryError, Result};
use crate::{HistoryPairStore, PairKey, Touched};

/// One serialized history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord<T> {
    pub key: PairKey,
    pub touched: bool,
    pub value: T,
}

impl<T> HistoryPairStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Owned entries as restart records, in key order.
    pub fn restart_records(&self) -> Vec<HistoryRecord<T>> {
        self.raw_entries()
            .map(|(key, entry)| HistoryRecord {
                key: *key,
                touched: entry.touched,
                value: entry.value.clone(),
            })
            .collect()
    }

    /// Serialize owned entries.
    pub fn write_restart(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.restart_records())?)
    }

    /// Replace the store content with the entries of `chunks` whose primary
    /// entity satisfies `is_owned`. Returns the number of entries kept.
    pub fn read_restart<'a, I, F>(&mut self, chunks: I, is_owned: F) -> Result<usize>
    where
        I: IntoIterator<Item = &'a [u8]>,
        F: Fn(EntityId) -> bool,
    {
        let mut records = Vec::new();
        for chunk in chunks {
            let decoded: Vec<HistoryRecord<T>> = bincode::deserialize(chunk)?;
            records.extend(decoded);
        }
        self.restore_records(records, is_owned)
    }

    /// Replace the store content with the given records whose primary
    /// entity satisfies `is_owned`.
    pub fn restore_records<I, F>(&mut self, records: I, is_owned: F) -> Result<usize>
    where
        I: IntoIterator<Item = HistoryRecord<T>>,
        F: Fn(EntityId) -> bool,
    {
        self.clear();
        for record in records.into_iter().filter(|r| is_owned(r.key.primary())) {
            let entry = Touched {
                touched: record.touched,
                value: record.value,
            };
            if self.insert_raw(record.key, entry).is_some() {
                return Err(HistoryError::DuplicateRecord(record.key));
            }
        }
        Ok(self.len())
    }
}
