//! Exchange configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration shared by all exchanges of a communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Upper bound for waiting on a single expected message.
    ///
    /// Exceeding it aborts the exchange with a message-count mismatch.
    pub recv_timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(30),
        }
    }
}

impl ExchangeConfig {
    /// A short timeout for tests and single-machine runs.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            recv_timeout: Duration::from_secs(5),
        }
    }

    /// Set the receive timeout.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }
}
