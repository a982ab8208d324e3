//! Error taxonomy and reconnect backoff for the ingestion pipeline

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the ingestion pipeline.
///
/// `Config` is non-retryable and fails fast before any connect. `Transport`
/// covers connection-level failures and feeds the bounded reconnect loop.
/// `ReconnectLimitExceeded` is terminal: the pipeline is in the Failed state
/// and the operator must intervene.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or invalid credentials/channel, or an invalid start request
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection-level transport failure
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Reconnect attempts exhausted; pipeline is Failed
    #[error("reconnect limit exceeded after {0} attempts")]
    ReconnectLimitExceeded(u32),
}

impl IngestError {
    /// Transport errors are retryable inside the pipeline's reconnect loop;
    /// everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Exponential backoff with jitter for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_attempt: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            current_attempt: 0,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Next delay, doubling per attempt up to the cap, with ±20% jitter.
    pub fn next_backoff(&mut self) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(self.current_attempt))
            .min(self.max_backoff_ms);

        self.current_attempt += 1;

        let jitter = (backoff_ms / 5) as i64;
        let jitter_amount = if jitter > 0 {
            fastrand::i64(-jitter..=jitter)
        } else {
            0
        };
        let final_backoff = (backoff_ms as i64 + jitter_amount).max(0) as u64;

        Duration::from_millis(final_backoff)
    }

    /// Reset after a successful connection so the next failure starts small.
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}
