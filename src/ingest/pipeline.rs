//! Chat ingestion pipeline
//!
//! One long-lived task owns the transport connection and walks the
//! `Disconnected -> Connecting -> Joined -> Streaming -> (Disconnected |
//! Failed)` state machine. The read loop is the only suspension point on the
//! transport; publishes are dispatched to spawned tasks bounded by a
//! semaphore, so a slow publish never delays the Pong reply and a saturated
//! publish path pauses reads instead of buffering events without bound.

use crate::config::ChatConfig;
use crate::ingest::decoder::{DecodedLine, LineDecoder};
use crate::ingest::errors::{ExponentialBackoff, IngestError};
use crate::ingest::telemetry::{MetricsSnapshot, PipelineMetrics};
use crate::stream::{publish_with_retry, EventStream, PublishRetryPolicy};
use crate::types::{ChatCredentials, ChatEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum PipelineState {
    /// Not connected (initial state, clean shutdown, or peer EOF)
    Disconnected = 0,
    /// Transport connect in progress
    Connecting = 1,
    /// Authenticated and joined; no chat content read yet
    Joined = 2,
    /// Read loop active
    Streaming = 3,
    /// Reconnect attempts exhausted; terminal, operator must intervene
    Failed = 4,
}

impl From<u8> for PipelineState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Joined,
            3 => Self::Streaming,
            _ => Self::Failed,
        }
    }
}

/// Operator-facing status: current state plus cumulative counters, so
/// failures are observable without reading logs.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: PipelineState,
    pub counters: MetricsSnapshot,
}

enum StreamExit {
    Shutdown,
    Eof,
}

/// Owns the transport connection for one channel and forwards decoded chat
/// events into the durable stream.
pub struct ChatIngestor {
    config: ChatConfig,
    retry: PublishRetryPolicy,
    credentials: ChatCredentials,
    channel: String,
    sink: Arc<dyn EventStream>,
    metrics: Arc<PipelineMetrics>,
    state: AtomicU8,
    running: AtomicBool,
    seq: AtomicU64,
    publish_permits: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ChatIngestor {
    /// Fails fast with a config error when credentials or channel are absent;
    /// no connection is attempted in that case.
    pub fn new(
        config: ChatConfig,
        retry: PublishRetryPolicy,
        credentials: ChatCredentials,
        sink: Arc<dyn EventStream>,
        metrics: Arc<PipelineMetrics>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self, IngestError> {
        if credentials.oauth_token.is_empty() {
            return Err(IngestError::Config("chat token is empty".to_string()));
        }
        if credentials.nickname.is_empty() {
            return Err(IngestError::Config("nickname is empty".to_string()));
        }
        if config.channel.trim_start_matches('#').is_empty() {
            return Err(IngestError::Config("channel is empty".to_string()));
        }

        let channel = config.channel.trim_start_matches('#').to_string();
        let max_in_flight = config.max_in_flight_publishes;

        Ok(Self {
            config,
            retry,
            credentials,
            channel,
            sink,
            metrics,
            state: AtomicU8::new(PipelineState::Disconnected as u8),
            running: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            publish_permits: Arc::new(Semaphore::new(max_in_flight)),
            shutdown_tx,
        })
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, new_state: PipelineState) {
        self.state.store(new_state as u8, Ordering::Release);
        debug!(state = ?new_state, "pipeline state changed");
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.state(),
            counters: self.metrics.snapshot(),
        }
    }

    /// Request a graceful stop. Idempotent; safe from any task.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the pipeline until shutdown, peer EOF, or terminal failure. The
    /// read loop is never reentered concurrently: a second `run` on the same
    /// instance is rejected.
    pub async fn run(&self) -> Result<(), IngestError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IngestError::Config(
                "pipeline is already running".to_string(),
            ));
        }
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> Result<(), IngestError> {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut backoff = ExponentialBackoff::new(
            self.config.reconnect_initial_backoff_ms,
            self.config.reconnect_max_backoff_ms,
        );

        loop {
            match self.connect_and_stream(&mut shutdown, &mut backoff).await {
                Ok(StreamExit::Shutdown) => {
                    self.set_state(PipelineState::Disconnected);
                    info!("pipeline stopped");
                    return Ok(());
                }
                Ok(StreamExit::Eof) => {
                    self.set_state(PipelineState::Disconnected);
                    info!("transport closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.reconnects.fetch_add(1, Ordering::Relaxed);
                    if backoff.attempt() >= self.config.reconnect_max_attempts {
                        self.set_state(PipelineState::Failed);
                        error!(error = %e, attempts = backoff.attempt(), "reconnect attempts exhausted, pipeline failed");
                        return Err(IngestError::ReconnectLimitExceeded(backoff.attempt()));
                    }
                    let delay = backoff.next_backoff();
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "transport error, reconnecting");
                    self.set_state(PipelineState::Disconnected);
                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!("pipeline stopped during reconnect backoff");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One connection lifetime. The transport is owned by this call and
    /// released on every exit path, including errors.
    async fn connect_and_stream(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
        backoff: &mut ExponentialBackoff,
    ) -> Result<StreamExit, IngestError> {
        self.set_state(PipelineState::Connecting);
        info!(server = %self.config.server, port = self.config.port, channel = %self.channel, "connecting");

        let mut stream =
            TcpStream::connect((self.config.server.as_str(), self.config.port)).await?;

        // authentication and join frames go out before any chat content is read
        let handshake = format!(
            "PASS oauth:{}\r\nNICK {}\r\nJOIN #{}\r\n",
            self.credentials.oauth_token, self.credentials.nickname, self.channel
        );
        stream.write_all(handshake.as_bytes()).await?;
        self.set_state(PipelineState::Joined);
        info!(channel = %self.channel, "joined channel");

        let (mut reader, mut writer) = stream.into_split();
        let mut decoder = LineDecoder::new(&self.config.username_exclusion);
        let mut read_buf = [0u8; 4096];
        // per-connection decoder; the shared counter only ever grows
        let mut filtered_seen: u64 = 0;

        self.set_state(PipelineState::Streaming);
        backoff.reset();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.drain_in_flight().await;
                    return Ok(StreamExit::Shutdown);
                }
                read = reader.read(&mut read_buf) => {
                    let n = read?;
                    if n == 0 {
                        self.drain_in_flight().await;
                        return Ok(StreamExit::Eof);
                    }

                    for line in decoder.feed(&read_buf[..n]) {
                        self.metrics.lines_decoded.fetch_add(1, Ordering::Relaxed);
                        match line {
                            // keep-alive replies take priority over message
                            // forwarding and never wait on a publish
                            DecodedLine::Ping { .. } => {
                                writer.write_all(b"PONG :tmi.twitch.tv\r\n").await?;
                                self.metrics.pings_answered.fetch_add(1, Ordering::Relaxed);
                            }
                            DecodedLine::Message { username, body } => {
                                self.dispatch_publish(username, body).await;
                            }
                            DecodedLine::Unrecognized { raw } => {
                                self.metrics.unrecognized_lines.fetch_add(1, Ordering::Relaxed);
                                debug!(line = %raw, "ignored non-chat line");
                            }
                        }
                    }
                    let filtered_total = decoder.filtered();
                    self.metrics
                        .bots_filtered
                        .fetch_add(filtered_total - filtered_seen, Ordering::Relaxed);
                    filtered_seen = filtered_total;
                }
            }
        }
    }

    /// Hand one event to the publish path without blocking the next read on
    /// the publish itself. Waiting on a permit here is the backpressure
    /// bound: when too many publishes are in flight, reads pause.
    async fn dispatch_publish(&self, username: String, body: String) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = ChatEvent::new(&self.channel, username, body, seq);
        self.metrics.messages_decoded.fetch_add(1, Ordering::Relaxed);

        let permit = match Arc::clone(&self.publish_permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed only on teardown
        };

        let sink = Arc::clone(&self.sink);
        let metrics = Arc::clone(&self.metrics);
        let retry = self.retry.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match publish_with_retry(sink.as_ref(), &event, &retry).await {
                Ok(()) => {
                    metrics.published.fetch_add(1, Ordering::Relaxed);
                }
                // a lost event is counted and logged, never a reason to drop
                // the connection
                Err(e) => {
                    metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, username = %event.username, "publish failed");
                }
            }
        });
    }

    /// Bounded-grace drain of in-flight publishes on the way out.
    async fn drain_in_flight(&self) {
        let all = self.config.max_in_flight_publishes as u32;
        let grace = Duration::from_millis(self.config.graceful_shutdown_timeout_ms);
        match tokio::time::timeout(grace, self.publish_permits.acquire_many(all)).await {
            Ok(Ok(_permits)) => debug!("all in-flight publishes drained"),
            Ok(Err(_)) => {}
            Err(_) => warn!(
                grace_ms = grace.as_millis() as u64,
                "shutdown grace period elapsed with publishes still in flight"
            ),
        }
    }
}
