//! Rate-limited clip action trigger
//!
//! Invokes the external Helix clip-creation call when a spike decision says
//! so. The cooldown is measured from the last *successful* fire: a failed API
//! call leaves the window untouched, so the next spike may try again; a
//! suppressed fire is an `ActionError::Cooldown`, counted by the caller and
//! never retried.

use crate::config::ClipConfig;
use crate::detector::TriggerDecision;
use crate::types::ClipCredentials;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failures of the external clip action. None of these affect ingestion
/// state; the detector keeps evaluating subsequent batches.
#[derive(Debug, Error)]
pub enum ActionError {
    /// `fire` was invoked for a decision that did not trigger
    #[error("fire invoked for a non-triggered decision")]
    NotTriggered,

    /// Within the cooldown interval since the previous fire
    #[error("suppressed by cooldown")]
    Cooldown,

    /// The clip API answered with a non-success status
    #[error("clip API returned status {0}")]
    Api(u16),

    /// The request never completed
    #[error("clip request failed: {0}")]
    Http(String),

    /// The clip API answered 2xx but the body was not usable
    #[error("malformed clip API response: {0}")]
    Response(String),
}

#[derive(Debug, Deserialize)]
struct ClipResponse {
    data: Vec<ClipData>,
}

#[derive(Debug, Deserialize)]
struct ClipData {
    id: String,
}

/// Cooldown-limited invoker of the Helix clip endpoint.
pub struct ClipTrigger {
    http: reqwest::Client,
    helix_url: String,
    broadcaster_id: String,
    credentials: ClipCredentials,
    cooldown: Duration,
    last_fire: Mutex<Option<Instant>>,
}

impl ClipTrigger {
    pub fn new(config: &ClipConfig, credentials: ClipCredentials) -> Result<Self> {
        if config.cooldown_secs == 0 {
            return Err(anyhow!("cooldown must be non-zero"));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            helix_url: config.helix_url.trim_end_matches('/').to_string(),
            broadcaster_id: config.broadcaster_id.clone(),
            credentials,
            cooldown: Duration::from_secs(config.cooldown_secs),
            last_fire: Mutex::new(None),
        })
    }

    fn in_cooldown(&self) -> bool {
        let last = self.last_fire.lock().unwrap_or_else(|e| e.into_inner());
        last.is_some_and(|at| at.elapsed() < self.cooldown)
    }

    fn mark_fired(&self) {
        let mut last = self.last_fire.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
    }

    /// Fire the clip action for a triggered decision. Returns the created
    /// clip id, or `Cooldown` when within the minimum interval since the last
    /// successful fire.
    pub async fn fire(&self, decision: &TriggerDecision) -> Result<String, ActionError> {
        if !decision.triggered {
            return Err(ActionError::NotTriggered);
        }
        if self.in_cooldown() {
            return Err(ActionError::Cooldown);
        }

        let url = format!("{}/clips", self.helix_url);
        let resp = self
            .http
            .post(&url)
            .query(&[
                ("broadcaster_id", self.broadcaster_id.as_str()),
                ("has_delay", "false"),
            ])
            .bearer_auth(&self.credentials.token)
            .header("Client-Id", &self.credentials.client_id)
            .send()
            .await
            .map_err(|e| ActionError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ActionError::Api(status.as_u16()));
        }

        let body: ClipResponse = resp
            .json()
            .await
            .map_err(|e| ActionError::Response(e.to_string()))?;
        let clip_id = body
            .data
            .into_iter()
            .next()
            .map(|clip| clip.id)
            .ok_or_else(|| ActionError::Response("empty data array".to_string()))?;

        self.mark_fired();
        Ok(clip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn triggered_decision(batch_id: u64) -> TriggerDecision {
        let mut counts = HashMap::new();
        counts.insert("hype".to_string(), 25);
        TriggerDecision {
            triggered: true,
            counts,
            total_hits: 25,
            window_start: 0,
            window_end: 24,
            batch_id,
        }
    }

    fn config_for(server_url: &str, cooldown_secs: u64) -> ClipConfig {
        ClipConfig {
            helix_url: server_url.to_string(),
            broadcaster_id: "12345".to_string(),
            cooldown_secs,
        }
    }

    fn credentials() -> ClipCredentials {
        ClipCredentials {
            token: "token".to_string(),
            client_id: "client".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_fire_returns_clip_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/clips")
            .match_query(mockito::Matcher::Any)
            .match_header("client-id", "client")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"AwkwardHelplessSalamander","edit_url":"https://clips.twitch.tv/x/edit"}]}"#)
            .create_async()
            .await;

        let trigger = ClipTrigger::new(&config_for(&server.url(), 60), credentials()).unwrap();
        let clip_id = trigger.fire(&triggered_decision(1)).await.unwrap();
        assert_eq!(clip_id, "AwkwardHelplessSalamander");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn second_fire_within_cooldown_is_suppressed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/clips")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[{"id":"first"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let trigger = ClipTrigger::new(&config_for(&server.url(), 3600), credentials()).unwrap();

        let first = trigger.fire(&triggered_decision(1)).await;
        assert!(first.is_ok());

        let second = trigger.fire(&triggered_decision(2)).await;
        assert!(matches!(second, Err(ActionError::Cooldown)));

        // exactly one request reached the API
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_fire_does_not_start_the_cooldown() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/clips")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let trigger = ClipTrigger::new(&config_for(&server.url(), 3600), credentials()).unwrap();

        let first = trigger.fire(&triggered_decision(1)).await;
        assert!(matches!(first, Err(ActionError::Api(503))));
        failing.assert_async().await;
        failing.remove_async().await;

        // the failure above must not have consumed the cooldown window
        let ok = server
            .mock("POST", "/clips")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[{"id":"second-try"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let second = trigger.fire(&triggered_decision(2)).await.unwrap();
        assert_eq!(second, "second-try");
        ok.assert_async().await;

        // the success does start it
        let third = trigger.fire(&triggered_decision(3)).await;
        assert!(matches!(third, Err(ActionError::Cooldown)));
    }

    #[tokio::test]
    async fn api_failure_is_reported_not_panicked() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/clips")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let trigger = ClipTrigger::new(&config_for(&server.url(), 60), credentials()).unwrap();
        let result = trigger.fire(&triggered_decision(1)).await;
        assert!(matches!(result, Err(ActionError::Api(503))));
    }

    #[tokio::test]
    async fn non_triggered_decision_is_rejected() {
        let server = mockito::Server::new_async().await;
        let trigger = ClipTrigger::new(&config_for(&server.url(), 60), credentials()).unwrap();

        let mut decision = triggered_decision(1);
        decision.triggered = false;
        let result = trigger.fire(&decision).await;
        assert!(matches!(result, Err(ActionError::NotTriggered)));
    }

    #[tokio::test]
    async fn empty_data_array_is_a_response_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/clips")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let trigger = ClipTrigger::new(&config_for(&server.url(), 60), credentials()).unwrap();
        let result = trigger.fire(&triggered_decision(1)).await;
        assert!(matches!(result, Err(ActionError::Response(_))));
    }
}
