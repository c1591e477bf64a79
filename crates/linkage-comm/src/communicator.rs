//! The transport seam used by every distributed phase.

use std::time::Duration;

use crate::envelope::{decode, encode, Envelope, Tag};
use crate::error::{CommError, Result};
use crate::{ExchangeConfig, Rank};

/// Point-to-point messaging plus the collectives built on it.
///
/// Implementors only provide `send` and a tag-matching `recv`; reductions
/// are derived from those. Sends never block. Messages from one sender to
/// one receiver are delivered in order.
pub trait Communicator {
    /// This process.
    fn rank(&self) -> Rank;

    /// Number of processes.
    fn size(&self) -> usize;

    fn config(&self) -> &ExchangeConfig;

    /// Post a message. Returns once it is queued.
    fn send(&self, to: Rank, tag: Tag, payload: Vec<u8>) -> Result<()>;

    /// Next message carrying `tag`, optionally restricted to one sender.
    ///
    /// Returns `Ok(None)` when nothing matching arrives within `timeout`.
    fn recv(&self, tag: Tag, from: Option<Rank>, timeout: Duration) -> Result<Option<Envelope>>;

    /// Collect one payload from every rank, indexed by rank.
    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let me = self.rank();
        let size = self.size();
        for peer in (0..size as u32).map(Rank).filter(|r| *r != me) {
            self.send(peer, Tag::Reduce, payload.clone())?;
        }

        let timeout = self.config().recv_timeout;
        let mut gathered = Vec::with_capacity(size);
        for peer in (0..size as u32).map(Rank) {
            if peer == me {
                gathered.push(payload.clone());
                continue;
            }
            let envelope = self
                .recv(Tag::Reduce, Some(peer), timeout)?
                .ok_or(CommError::ReductionTimeout { rank: me, peer })?;
            gathered.push(envelope.payload);
        }
        Ok(gathered)
    }

    /// Element-wise sum over all ranks.
    fn sum_all(&self, local: &[u64]) -> Result<Vec<u64>> {
        let mut total = vec![0u64; local.len()];
        for (peer, bytes) in self.all_gather(encode(local)?)?.iter().enumerate() {
            let part: Vec<u64> = decode(bytes)?;
            if part.len() != local.len() {
                return Err(CommError::ReductionLength {
                    peer: Rank(peer as u32),
                    local: local.len(),
                    remote: part.len(),
                });
            }
            for (acc, v) in total.iter_mut().zip(part) {
                *acc += v;
            }
        }
        Ok(total)
    }

    /// Element-wise sum over all ranks, accumulated in rank order so every
    /// rank obtains bit-identical results.
    fn sum_all_f64(&self, local: &[f64]) -> Result<Vec<f64>> {
        let mut total = vec![0.0; local.len()];
        for (peer, bytes) in self.all_gather(encode(local)?)?.iter().enumerate() {
            let part: Vec<f64> = decode(bytes)?;
            if part.len() != local.len() {
                return Err(CommError::ReductionLength {
                    peer: Rank(peer as u32),
                    local: local.len(),
                    remote: part.len(),
                });
            }
            for (acc, v) in total.iter_mut().zip(part) {
                *acc += v;
            }
        }
        Ok(total)
    }

    /// Maximum over all ranks.
    fn max_all_f64(&self, local: f64) -> Result<f64> {
        let mut max = f64::NEG_INFINITY;
        for bytes in self.all_gather(encode(&local)?)? {
            max = max.max(decode::<f64>(&bytes)?);
        }
        Ok(max)
    }

    /// Wait until every rank reaches this point.
    fn barrier(&self) -> Result<()> {
        self.all_gather(Vec::new()).map(|_| ())
    }
}
