//! Configuration for the clipcast pipeline
//!
//! Configuration is loaded from a TOML file, then overridden by environment
//! variables, then validated. Secrets (chat token, clip API credentials) are
//! never part of the file; they come from the environment at startup.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chat transport and pipeline lifecycle
    #[serde(default)]
    pub chat: ChatConfig,

    /// Durable event stream (Kinesis)
    #[serde(default)]
    pub stream: StreamConfig,

    /// Keyword spike detection
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Clip action trigger
    #[serde(default)]
    pub clip: ClipConfig,

    /// Interval between periodic status log lines (seconds)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

// serde defaults only apply during deserialization, so the no-file path must
// fill them in by hand
impl Default for Config {
    fn default() -> Self {
        Self {
            chat: ChatConfig::default(),
            stream: StreamConfig::default(),
            detector: DetectorConfig::default(),
            clip: ClipConfig::default(),
            status_interval_secs: default_status_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// IRC server hostname
    #[serde(default = "default_server")]
    pub server: String,

    /// IRC server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Channel to join (leading '#' optional)
    #[serde(default)]
    pub channel: String,

    /// Bot nickname used for the NICK frame
    #[serde(default)]
    pub nickname: String,

    /// Username exclusion substring, matched case-insensitively at decode time
    #[serde(default = "default_exclusion")]
    pub username_exclusion: String,

    /// Maximum unacknowledged publishes in flight; reads pause at the bound
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_publishes: usize,

    /// Reconnect attempts before the pipeline transitions to Failed
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_max_attempts: u32,

    /// Initial reconnect backoff (milliseconds)
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_backoff_ms: u64,

    /// Maximum reconnect backoff (milliseconds)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_backoff_ms: u64,

    /// Grace period for draining in-flight publishes on shutdown (milliseconds)
    #[serde(default = "default_shutdown_grace_ms")]
    pub graceful_shutdown_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            channel: String::new(),
            nickname: String::new(),
            username_exclusion: default_exclusion(),
            max_in_flight_publishes: default_max_in_flight(),
            reconnect_max_attempts: default_reconnect_attempts(),
            reconnect_initial_backoff_ms: default_reconnect_initial_ms(),
            reconnect_max_backoff_ms: default_reconnect_max_ms(),
            graceful_shutdown_timeout_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Kinesis stream name
    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    /// Publish attempt ceiling (first try included)
    #[serde(default = "default_publish_attempts")]
    pub publish_max_attempts: u32,

    /// Base delay for publish retry backoff (milliseconds)
    #[serde(default = "default_publish_base_ms")]
    pub publish_base_backoff_ms: u64,

    /// Cap on a single publish retry delay (milliseconds)
    #[serde(default = "default_publish_max_ms")]
    pub publish_max_backoff_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: default_stream_name(),
            publish_max_attempts: default_publish_attempts(),
            publish_base_backoff_ms: default_publish_base_ms(),
            publish_max_backoff_ms: default_publish_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Keywords matched case-insensitively as substrings
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Total keyword hits per batch required to trigger a clip
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Interval between stream polls (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum records fetched per poll
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            threshold: default_threshold(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_limit: default_batch_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    /// Helix API base URL
    #[serde(default = "default_helix_url")]
    pub helix_url: String,

    /// Broadcaster whose stream gets clipped
    #[serde(default)]
    pub broadcaster_id: String,

    /// Minimum interval between two successful clip creations (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            helix_url: default_helix_url(),
            broadcaster_id: String::new(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_server() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_port() -> u16 {
    6667
}

fn default_exclusion() -> String {
    "bot".to_string()
}

fn default_max_in_flight() -> usize {
    64
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    15_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_stream_name() -> String {
    "twitch-chat-stream".to_string()
}

fn default_publish_attempts() -> u32 {
    5
}

fn default_publish_base_ms() -> u64 {
    100
}

fn default_publish_max_ms() -> u64 {
    5_000
}

fn default_keywords() -> Vec<String> {
    ["LOL", "OMG", "WOW", "hype", "W"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_threshold() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_batch_limit() -> usize {
    1_000
}

fn default_helix_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_status_interval() -> u64 {
    15
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("failed to read config file: {}", e))?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| anyhow!("failed to parse TOML config: {}", e))?;
        Ok(config)
    }

    /// Load from file when present (defaults otherwise), apply environment
    /// overrides, then validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!(
                path = %path.as_ref().display(),
                "config file not found, using defaults"
            );
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment variables override file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(server) = std::env::var("CHAT_SERVER") {
            self.chat.server = server;
        }
        if let Ok(channel) = std::env::var("CHAT_CHANNEL") {
            self.chat.channel = channel;
        }
        if let Ok(nickname) = std::env::var("CHAT_NICKNAME") {
            self.chat.nickname = nickname;
        }
        if let Ok(stream_name) = std::env::var("KINESIS_STREAM_NAME") {
            self.stream.stream_name = stream_name;
        }
        if let Ok(broadcaster) = std::env::var("BROADCASTER_ID") {
            self.clip.broadcaster_id = broadcaster;
        }
        if let Ok(threshold) = std::env::var("SPIKE_THRESHOLD") {
            self.detector.threshold = threshold
                .parse()
                .map_err(|e| anyhow!("invalid SPIKE_THRESHOLD: {}", e))?;
        }
        if let Ok(cooldown) = std::env::var("CLIP_COOLDOWN_SECS") {
            self.clip.cooldown_secs = cooldown
                .parse()
                .map_err(|e| anyhow!("invalid CLIP_COOLDOWN_SECS: {}", e))?;
        }
        Ok(())
    }

    /// Validate numeric and structural invariants. Presence of credentials and
    /// channel is checked at pipeline start, not here.
    pub fn validate(&self) -> Result<()> {
        if self.chat.server.is_empty() {
            return Err(anyhow!("chat.server must not be empty"));
        }
        if self.chat.max_in_flight_publishes == 0 {
            return Err(anyhow!("chat.max_in_flight_publishes must be > 0"));
        }
        if self.chat.reconnect_max_attempts == 0 {
            return Err(anyhow!("chat.reconnect_max_attempts must be > 0"));
        }
        if self.chat.reconnect_initial_backoff_ms == 0 {
            return Err(anyhow!("chat.reconnect_initial_backoff_ms must be > 0"));
        }
        if self.chat.reconnect_initial_backoff_ms > self.chat.reconnect_max_backoff_ms {
            return Err(anyhow!(
                "chat.reconnect_initial_backoff_ms must be <= chat.reconnect_max_backoff_ms"
            ));
        }
        if self.stream.stream_name.is_empty() {
            return Err(anyhow!("stream.stream_name must not be empty"));
        }
        if self.stream.publish_max_attempts == 0 {
            return Err(anyhow!("stream.publish_max_attempts must be > 0"));
        }
        if self.detector.keywords.is_empty() {
            return Err(anyhow!("detector.keywords must not be empty"));
        }
        if self.detector.threshold == 0 {
            return Err(anyhow!("detector.threshold must be > 0"));
        }
        if self.detector.poll_interval_ms == 0 {
            return Err(anyhow!("detector.poll_interval_ms must be > 0"));
        }
        if self.detector.batch_limit == 0 || self.detector.batch_limit > 10_000 {
            return Err(anyhow!("detector.batch_limit must be in range [1, 10000]"));
        }
        if self.clip.helix_url.is_empty() {
            return Err(anyhow!("clip.helix_url must not be empty"));
        }
        if self.clip.cooldown_secs == 0 {
            return Err(anyhow!("clip.cooldown_secs must be > 0"));
        }
        if self.status_interval_secs == 0 {
            return Err(anyhow!("status_interval_secs must be > 0"));
        }
        Ok(())
    }
}
