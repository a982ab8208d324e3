//! Atomic pipeline counters and status snapshot export

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters shared across the ingest, publish, and detector tasks.
/// All fields are plain atomics so hot-path updates never contend on a lock.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Lines emitted by the decoder (all variants)
    pub lines_decoded: AtomicU64,
    /// Chat messages turned into events
    pub messages_decoded: AtomicU64,
    /// Chat messages dropped by the username exclusion filter
    pub bots_filtered: AtomicU64,
    /// Non-chat lines ignored at debug level
    pub unrecognized_lines: AtomicU64,
    /// Keep-alives answered with a Pong
    pub pings_answered: AtomicU64,
    /// Successful event publishes
    pub published: AtomicU64,
    /// Publishes that exhausted their retry ceiling
    pub publish_failures: AtomicU64,
    /// Reconnect attempts consumed by transport errors
    pub reconnects: AtomicU64,
    /// Batches evaluated by the spike detector
    pub batches_evaluated: AtomicU64,
    /// Successful clip trigger fires
    pub triggers_fired: AtomicU64,
    /// Trigger fires suppressed by the cooldown
    pub triggers_suppressed: AtomicU64,
    /// Trigger fires that failed at the external API
    pub trigger_errors: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent-enough point-in-time copy for status reporting. Individual
    /// loads are relaxed; the snapshot is observability data, not a ledger.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_decoded: self.lines_decoded.load(Ordering::Relaxed),
            messages_decoded: self.messages_decoded.load(Ordering::Relaxed),
            bots_filtered: self.bots_filtered.load(Ordering::Relaxed),
            unrecognized_lines: self.unrecognized_lines.load(Ordering::Relaxed),
            pings_answered: self.pings_answered.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            batches_evaluated: self.batches_evaluated.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            triggers_suppressed: self.triggers_suppressed.load(Ordering::Relaxed),
            trigger_errors: self.trigger_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot exposed through `status()` and the periodic
/// status log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lines_decoded: u64,
    pub messages_decoded: u64,
    pub bots_filtered: u64,
    pub unrecognized_lines: u64,
    pub pings_answered: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub reconnects: u64,
    pub batches_evaluated: u64,
    pub triggers_fired: u64,
    pub triggers_suppressed: u64,
    pub trigger_errors: u64,
}
