//! Counted sparse exchange.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use tracing::trace;

use crate::envelope::{decode, encode, Tag};
use crate::error::{CommError, Result};
use crate::{Communicator, Rank};

/// Items to send, grouped by destination rank.
pub type Outbox<T> = BTreeMap<Rank, Vec<T>>;

/// Send every non-empty bundle of `outbox` and receive everything
/// addressed to this rank in the same phase.
///
/// Bundles addressed to the local rank are returned without being sent.
/// The result is sorted by source rank, so callers that fold it in order
/// behave the same regardless of arrival order.
pub fn exchange<C, T>(comm: &C, tag: Tag, outbox: Outbox<T>) -> Result<Vec<(Rank, Vec<T>)>>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned,
{
    let me = comm.rank();
    let size = comm.size();

    let mut targets = vec![0u64; size];
    let mut received = Vec::new();
    let mut outgoing = Vec::new();
    for (to, items) in outbox {
        if items.is_empty() {
            continue;
        }
        if to == me {
            received.push((me, items));
            continue;
        }
        if to.index() >= size {
            return Err(CommError::UnknownRank { to, size });
        }
        targets[to.index()] = 1;
        outgoing.push((to, items));
    }

    let expected = comm.sum_all(&targets)?[me.index()];

    for (to, items) in &outgoing {
        comm.send(*to, tag, encode(items)?)?;
    }

    let timeout = comm.config().recv_timeout;
    let mut count = 0u64;
    while count < expected {
        let Some(envelope) = comm.recv(tag, None, timeout)? else {
            return Err(CommError::MessageCountMismatch {
                rank: me,
                tag,
                expected,
                received: count,
                timeout,
            });
        };
        received.push((envelope.from, decode(&envelope.payload)?));
        count += 1;
    }

    trace!(%me, %tag, sent = outgoing.len(), received = count, "exchange complete");
    received.sort_by_key(|(from, _)| *from);
    Ok(received)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::{Envelope, ExchangeConfig, LocalCluster};

    /// Wraps a communicator and silently loses every message with `lost`.
    struct Lossy<C> {
        inner: C,
        lost: Tag,
    }

    impl<C: Communicator> Communicator for Lossy<C> {
        fn rank(&self) -> Rank {
            self.inner.rank()
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn config(&self) -> &ExchangeConfig {
            self.inner.config()
        }

        fn send(&self, to: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
            if tag == self.lost {
                return Ok(());
            }
            self.inner.send(to, tag, payload)
        }

        fn recv(&self, tag: Tag, from: Option<Rank>, timeout: Duration) -> Result<Option<Envelope>> {
            self.inner.recv(tag, from, timeout)
        }
    }

    #[test]
    fn lost_message_is_a_count_mismatch() {
        let config = ExchangeConfig::fast().with_recv_timeout(Duration::from_millis(200));
        let comms = LocalCluster::new(2, config).unwrap();
        let results: Vec<Result<Vec<(Rank, Vec<u32>)>>> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let me = comm.rank();
                        let peer = Rank(1 - me.0);
                        let outbox: Outbox<u32> = [(peer, vec![me.0])].into_iter().collect();
                        if me == Rank(0) {
                            let lossy = Lossy {
                                inner: comm,
                                lost: Tag::UnbindEvent,
                            };
                            exchange(&lossy, Tag::UnbindEvent, outbox)
                        } else {
                            exchange(&comm, Tag::UnbindEvent, outbox)
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut results = results.into_iter();
        let from_one = results.next().unwrap().unwrap();
        assert_eq!(from_one, vec![(Rank(1), vec![1])]);
        match results.next().unwrap() {
            Err(CommError::MessageCountMismatch {
                rank,
                tag,
                expected,
                received,
                timeout,
            }) => {
                assert_eq!(rank, Rank(1));
                assert_eq!(tag, Tag::UnbindEvent);
                assert_eq!((expected, received), (1, 0));
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected a count mismatch, got {other:?}"),
        }
    }
}
