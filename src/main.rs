//! clipcast entry point
//!
//! Wires the ingestion pipeline, the spike detector, and the clip trigger
//! together: one ingest task per channel, one detector polling task, a
//! periodic status log line, and a ctrl-c driven graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use clipcast::clip::ClipTrigger;
use clipcast::config::Config;
use clipcast::detector::{KeywordSpikeDetector, SpikeRunner};
use clipcast::ingest::{ChatIngestor, PipelineMetrics};
use clipcast::stream::{EventStream, KinesisStream, PublishRetryPolicy};
use clipcast::types::{ChatCredentials, ClipCredentials};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "clipcast.toml")]
    config: String,

    /// Channel to ingest (overrides the config file)
    #[arg(long)]
    channel: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("clipcast=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose);

    info!("starting clipcast {}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&args.config)?;
    if let Some(channel) = args.channel {
        config.chat.channel = channel;
    }

    // opaque credentials injected at start; no OAuth flow, no global state
    let token = std::env::var("TWITCH_AUTH_TOKEN")
        .context("TWITCH_AUTH_TOKEN must be set (bearer token with chat:read scope)")?;
    let client_id =
        std::env::var("TWITCH_CLIENT_ID").context("TWITCH_CLIENT_ID must be set")?;
    let chat_credentials = ChatCredentials::new(token.clone(), config.chat.nickname.clone());
    let clip_credentials = ClipCredentials { token, client_id };

    let metrics = Arc::new(PipelineMetrics::new());
    let (shutdown_tx, _) = broadcast::channel(4);

    info!(stream = %config.stream.stream_name, "connecting event stream client");
    let sink: Arc<dyn EventStream> =
        Arc::new(KinesisStream::from_env(&config.stream.stream_name).await);

    let retry = PublishRetryPolicy {
        max_attempts: config.stream.publish_max_attempts,
        base_backoff_ms: config.stream.publish_base_backoff_ms,
        max_backoff_ms: config.stream.publish_max_backoff_ms,
    };
    let ingestor = Arc::new(ChatIngestor::new(
        config.chat.clone(),
        retry,
        chat_credentials,
        Arc::clone(&sink),
        Arc::clone(&metrics),
        shutdown_tx.clone(),
    )?);

    let detector = KeywordSpikeDetector::new(&config.detector.keywords, config.detector.threshold);
    let trigger = ClipTrigger::new(&config.clip, clip_credentials)?;
    let runner = SpikeRunner::new(
        Arc::clone(&sink),
        detector,
        trigger,
        Duration::from_millis(config.detector.poll_interval_ms),
        config.detector.batch_limit,
        Arc::clone(&metrics),
        shutdown_tx.clone(),
    );

    let ingest_task = {
        let ingestor = Arc::clone(&ingestor);
        tokio::spawn(async move { ingestor.run().await })
    };
    let detector_task = tokio::spawn(async move { runner.run().await });

    // periodic operator-facing status line
    let status_task = {
        let ingestor = Arc::clone(&ingestor);
        let interval = Duration::from_secs(config.status_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let status = ingestor.status();
                match serde_json::to_string(&status) {
                    Ok(json) => info!(status = %json, "pipeline status"),
                    Err(e) => warn!(error = %e, "status serialization failed"),
                }
            }
        })
    };

    let mut ingest_task = ingest_task;
    let mut ingest_done = false;
    let exit: Result<()> = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
        joined = &mut ingest_task => {
            ingest_done = true;
            match joined {
                Ok(Ok(())) => {
                    info!("ingestion ended");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = %e, "ingestion failed");
                    Err(e).context("chat ingestion pipeline failed")
                }
                Err(e) => Err(e).context("ingest task panicked"),
            }
        }
    };

    let _ = shutdown_tx.send(());
    status_task.abort();

    let grace = Duration::from_millis(config.chat.graceful_shutdown_timeout_ms);
    if tokio::time::timeout(grace, async {
        if !ingest_done {
            let _ = (&mut ingest_task).await;
        }
        let _ = detector_task.await;
    })
    .await
    .is_err()
    {
        warn!("tasks did not stop within the shutdown grace period");
    }

    let final_status = ingestor.status();
    info!(
        state = ?final_status.state,
        published = final_status.counters.published,
        publish_failures = final_status.counters.publish_failures,
        triggers_fired = final_status.counters.triggers_fired,
        "final status"
    );

    exit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["clipcast"]).unwrap();
        assert_eq!(args.config, "clipcast.toml");
        assert!(args.channel.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn args_channel_override() {
        let args = Args::try_parse_from(["clipcast", "--channel", "jynxzi", "-v"]).unwrap();
        assert_eq!(args.channel.as_deref(), Some("jynxzi"));
        assert!(args.verbose);
    }
}
