//! Detector polling task
//!
//! One periodic task consumes newly published events through the stream
//! cursor, evaluates each batch, and fires the clip trigger on a spike.
//! Because there is exactly one runner task, two evaluations never run
//! concurrently over overlapping event ranges, so a spike cannot
//! double-trigger.

use crate::clip::{ActionError, ClipTrigger};
use crate::detector::KeywordSpikeDetector;
use crate::ingest::telemetry::PipelineMetrics;
use crate::stream::EventStream;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct SpikeRunner {
    stream: Arc<dyn EventStream>,
    detector: KeywordSpikeDetector,
    trigger: ClipTrigger,
    poll_interval: Duration,
    batch_limit: usize,
    metrics: Arc<PipelineMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SpikeRunner {
    pub fn new(
        stream: Arc<dyn EventStream>,
        detector: KeywordSpikeDetector,
        trigger: ClipTrigger,
        poll_interval: Duration,
        batch_limit: usize,
        metrics: Arc<PipelineMetrics>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            stream,
            detector,
            trigger,
            poll_interval,
            batch_limit,
            metrics,
            shutdown_tx,
        }
    }

    /// Poll until shutdown. Cursor failures reopen the cursor on the next
    /// tick rather than killing the task.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut cursor = self.stream.open_cursor().await?;
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut batch_id: u64 = 0;

        info!(
            threshold = self.detector.threshold(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "spike detector started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("spike detector stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let events = match self.stream.next_batch(&mut cursor, self.batch_limit).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "stream read failed, reopening cursor");
                    match self.stream.open_cursor().await {
                        Ok(reopened) => cursor = reopened,
                        Err(e) => warn!(error = %e, "cursor reopen failed"),
                    }
                    continue;
                }
            };

            if events.is_empty() {
                continue;
            }

            batch_id += 1;
            let decision = self.detector.evaluate(&events, batch_id);
            self.metrics.batches_evaluated.fetch_add(1, Ordering::Relaxed);

            if !decision.triggered {
                debug!(
                    batch_id,
                    total_hits = decision.total_hits,
                    "no spike in batch"
                );
                continue;
            }

            info!(batch_id, total_hits = decision.total_hits, counts = ?decision.counts, "keyword spike detected");
            match self.trigger.fire(&decision).await {
                Ok(clip_id) => {
                    self.metrics.triggers_fired.fetch_add(1, Ordering::Relaxed);
                    info!(%clip_id, batch_id, "clip created");
                }
                Err(ActionError::Cooldown) => {
                    self.metrics
                        .triggers_suppressed
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(batch_id, "trigger suppressed by cooldown");
                }
                // one failed trigger never halts ingestion or evaluation
                Err(e) => {
                    self.metrics.trigger_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, batch_id, "clip trigger failed");
                }
            }
        }
    }
}
