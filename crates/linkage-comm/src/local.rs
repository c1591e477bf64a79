//! In-process cluster: one mailbox per rank, ranks run on their own threads.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::envelope::{Envelope, Tag};
use crate::error::{CommError, Result};
use crate::{Communicator, ExchangeConfig, Rank};

/// Factory for a fully connected set of in-process ranks.
pub struct LocalCluster;

impl LocalCluster {
    /// Create `size` connected communicators, one per rank.
    ///
    /// Each communicator is meant to be moved onto its own thread.
    pub fn new(size: usize, config: ExchangeConfig) -> Result<Vec<LocalComm>> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| unbounded_channel::<Envelope>()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| -> Result<LocalComm> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()?;
                Ok(LocalComm {
                    rank: Rank(rank as u32),
                    config,
                    peers: senders.clone(),
                    mailbox: Mutex::new(Mailbox {
                        rx,
                        parked: VecDeque::new(),
                    }),
                    runtime,
                })
            })
            .collect()
    }
}

struct Mailbox {
    rx: UnboundedReceiver<Envelope>,
    /// Messages that arrived before the phase that wants them.
    parked: VecDeque<Envelope>,
}

/// One rank of a [`LocalCluster`].
pub struct LocalComm {
    rank: Rank,
    config: ExchangeConfig,
    peers: Vec<UnboundedSender<Envelope>>,
    mailbox: Mutex<Mailbox>,
    runtime: Runtime,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.peers.len())
            .finish()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn send(&self, to: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let peer = self.peers.get(to.index()).ok_or(CommError::UnknownRank {
            to,
            size: self.peers.len(),
        })?;
        peer.send(Envelope {
            from: self.rank,
            tag,
            payload,
        })
        .map_err(|_| CommError::Disconnected(to))
    }

    fn recv(&self, tag: Tag, from: Option<Rank>, timeout: Duration) -> Result<Option<Envelope>> {
        let wanted = |e: &Envelope| e.tag == tag && from.map_or(true, |r| e.from == r);

        let mut mailbox = self
            .mailbox
            .lock()
            .map_err(|_| CommError::Poisoned(self.rank))?;

        if let Some(pos) = mailbox.parked.iter().position(wanted) {
            return Ok(mailbox.parked.remove(pos));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let next = self
                .runtime
                .block_on(tokio::time::timeout(remaining, mailbox.rx.recv()));
            match next {
                Err(_elapsed) => return Ok(None),
                Ok(None) => return Err(CommError::Disconnected(self.rank)),
                Ok(Some(envelope)) if wanted(&envelope) => return Ok(Some(envelope)),
                Ok(Some(envelope)) => mailbox.parked.push_back(envelope),
            }
        }
    }
}
