//! Slack alert client
//!
//! Posts warning/error notifications to the operator channel via
//! `chat.postMessage`. Delivery is best-effort; callers must never treat a
//! send failure as fatal.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use skymirror_common::{Error, Result};

use crate::notify::{AlertClient, Severity};

const SLACK_API_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client with a bot token
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    channel: String,
}

impl SlackClient {
    /// `channel` is the full channel name, `#` included
    pub fn new(
        token: impl Into<String>,
        channel: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token: token.into(),
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl AlertClient for SlackClient {
    async fn send(&self, severity: Severity, message: &str) -> Result<()> {
        let payload = json!({
            "channel": self.channel,
            "text": format!("{} *{}*: {}", severity.emoji(), severity.label(), message),
        });

        let response = self
            .http
            .post(SLACK_API_URL)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let body: PostMessageResponse = response.json().await?;
        if !body.ok {
            return Err(Error::Internal(format!(
                "slack chat.postMessage failed: {}",
                body.error.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        Ok(())
    }
}
