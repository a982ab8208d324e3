//! Durable event stream abstraction
//!
//! The pipeline publishes through the `EventStream` trait and the detector
//! reads back through it, so tests substitute an in-memory implementation for
//! the Kinesis-backed one.

pub mod kinesis;

use crate::ingest::errors::ExponentialBackoff;
use crate::types::ChatEvent;
use async_trait::async_trait;
use thiserror::Error;

pub use kinesis::KinesisStream;

/// Publish-side failures. Transient failures are eligible for retry;
/// exhausting the attempt ceiling surfaces `RetriesExhausted` to the caller
/// instead of silently dropping the event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event serialization failed: {0}")]
    Serialization(String),

    #[error("transient publish failure: {0}")]
    Transient(String),

    #[error("publish retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Read-side failures for the detector's polling cursor.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("cursor error: {0}")]
    Cursor(String),

    #[error("record read failure: {0}")]
    Read(String),
}

/// Opaque position in the stream. The token format is backend-defined (a
/// shard iterator for Kinesis); `None` means the cursor is exhausted and must
/// be reopened.
#[derive(Debug, Clone)]
pub struct StreamCursor {
    pub token: Option<String>,
}

impl StreamCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.token.is_none()
    }
}

/// Append/consume contract for the durable ordered log. Implementations must
/// be safe to call concurrently for different events over one shared handle.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Append one event, partitioned by username. Single attempt; retry
    /// policy is layered on top by [`publish_with_retry`].
    async fn publish(&self, event: &ChatEvent) -> Result<(), PublishError>;

    /// Open a cursor at the latest stream position.
    async fn open_cursor(&self) -> Result<StreamCursor, ConsumeError>;

    /// Fetch the next ordered batch after the cursor, advancing it.
    async fn next_batch(
        &self,
        cursor: &mut StreamCursor,
        limit: usize,
    ) -> Result<Vec<ChatEvent>, ConsumeError>;
}

/// Bounded exponential backoff policy for the publish path.
#[derive(Debug, Clone)]
pub struct PublishRetryPolicy {
    /// Attempt ceiling, first try included
    pub max_attempts: u32,
    /// First retry delay in milliseconds; doubles per retry, jittered
    pub base_backoff_ms: u64,
    /// Cap on a single retry delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for PublishRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

/// Publish with bounded exponential backoff, doubling from the base delay up
/// to the cap. Only transient failures are retried; on ceiling exhaustion the
/// last error is surfaced as `RetriesExhausted`.
pub async fn publish_with_retry(
    stream: &dyn EventStream,
    event: &ChatEvent,
    policy: &PublishRetryPolicy,
) -> Result<(), PublishError> {
    let mut backoff = ExponentialBackoff::new(policy.base_backoff_ms, policy.max_backoff_ms);
    loop {
        match stream.publish(event).await {
            Ok(()) => return Ok(()),
            Err(PublishError::Transient(msg)) => {
                if backoff.attempt() + 1 >= policy.max_attempts {
                    return Err(PublishError::RetriesExhausted {
                        attempts: policy.max_attempts,
                        last: msg,
                    });
                }
                tokio::time::sleep(backoff.next_backoff()).await;
            }
            Err(other) => return Err(other),
        }
    }
}
