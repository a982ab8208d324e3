// Ingestion pipeline components
pub mod decoder; // line-buffered IRC frame decode (hot path)
pub mod errors; // IngestError taxonomy, reconnect backoff
pub mod pipeline; // connection lifecycle state machine + read loop
pub mod telemetry; // atomic counters, status snapshot

pub use decoder::{DecodedLine, LineDecoder};
pub use errors::{ExponentialBackoff, IngestError};
pub use pipeline::{ChatIngestor, PipelineState, StatusReport};
pub use telemetry::{MetricsSnapshot, PipelineMetrics};
