//! Shared domain types for the clipcast pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// One decoded, filtered chat message ready for downstream publish.
///
/// The wire payload is the flat `{username, message, channel}` mapping;
/// `received_at` is a local monotonic sequence number and never leaves the
/// process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub username: String,
    pub message: String,
    pub channel: String,
    #[serde(skip)]
    pub received_at: u64,
}

impl ChatEvent {
    /// Create a new event. The channel is normalized by stripping the leading
    /// IRC channel marker.
    pub fn new(
        channel: &str,
        username: impl Into<String>,
        message: impl Into<String>,
        received_at: u64,
    ) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            channel: channel.trim_start_matches('#').to_string(),
            received_at,
        }
    }
}

/// Record handed to the event stream put call. Constructed immediately before
/// the publish attempt; the partition key is always the username so per-user
/// ordering survives sharding.
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub stream_name: String,
    pub partition_key: String,
    pub payload: Vec<u8>,
}

impl PublishRecord {
    pub fn for_event(stream_name: &str, event: &ChatEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            stream_name: stream_name.to_string(),
            partition_key: event.username.clone(),
            payload: serde_json::to_vec(event)?,
        })
    }
}

/// Chat transport credentials, owned by the pipeline instance that receives
/// them at start. No process-wide credential state.
#[derive(Clone)]
pub struct ChatCredentials {
    pub oauth_token: String,
    pub nickname: String,
}

impl ChatCredentials {
    pub fn new(oauth_token: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            oauth_token: oauth_token.into(),
            nickname: nickname.into(),
        }
    }
}

impl fmt::Debug for ChatCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCredentials")
            .field("oauth_token", &"<redacted>")
            .field("nickname", &self.nickname)
            .finish()
    }
}

/// Credentials for the external clip API call.
#[derive(Clone)]
pub struct ClipCredentials {
    pub token: String,
    pub client_id: String,
}

impl fmt::Debug for ClipCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipCredentials")
            .field("token", &"<redacted>")
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_marker_is_stripped() {
        let event = ChatEvent::new("#jynxzi", "alice", "hype", 1);
        assert_eq!(event.channel, "jynxzi");

        let bare = ChatEvent::new("jynxzi", "alice", "hype", 2);
        assert_eq!(bare.channel, "jynxzi");
    }

    #[test]
    fn payload_has_exactly_the_wire_fields() {
        let event = ChatEvent::new("#chan", "alice", "WOW", 42);
        let record = PublishRecord::for_event("twitch-chat-stream", &event).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&record.payload).unwrap();

        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["username"], "alice");
        assert_eq!(obj["message"], "WOW");
        assert_eq!(obj["channel"], "chan");
        assert_eq!(record.partition_key, "alice");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = ChatCredentials::new("super-secret", "streamwatcher");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
