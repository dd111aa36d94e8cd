//! Outbound alert channel
//!
//! `TelegramChannel` posts HTML messages to a bot chat. A missing token is
//! not fatal: the message is logged and reported as undelivered, so the
//! dispatcher will retry it on the next occurrence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AlertsConfig;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Channel returned status {0}")]
    Rejected(reqwest::StatusCode),
    #[error("Channel refused message: {0}")]
    Refused(String),
    #[error("Alert channel not configured")]
    NotConfigured,
}

/// Delivers formatted alert text.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// `Ok` only on confirmed delivery
    async fn send(&self, text: &str) -> Result<(), AlertError>;

    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Bot API envelope. Delivery is confirmed only by `ok: true`.
#[derive(Deserialize)]
struct SendResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

fn confirm_delivery(status: reqwest::StatusCode, body: &[u8]) -> Result<(), AlertError> {
    if status != reqwest::StatusCode::OK {
        return Err(AlertError::Rejected(status));
    }
    match serde_json::from_slice::<SendResponse>(body) {
        Ok(SendResponse { ok: true, .. }) => Ok(()),
        Ok(SendResponse { description, .. }) => Err(AlertError::Refused(
            description.unwrap_or_else(|| "ok=false".to_string()),
        )),
        Err(e) => Err(AlertError::Refused(format!("unreadable response: {e}"))),
    }
}

/// Bot API `sendMessage` channel.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
    chat_id: i64,
}

impl TelegramChannel {
    pub fn new(
        api_base: &str,
        token: Option<String>,
        chat_id: i64,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
        })
    }

    /// Build from `[alerts]`, reading the token from its environment variable.
    pub fn from_config(config: &AlertsConfig) -> Result<Self, AlertError> {
        let token = config.bot_token();
        if token.is_none() {
            warn!(env = %config.bot_token_env, "No bot token set, alerts will only be logged");
        }
        Self::new(
            &config.api_base,
            token,
            config.chat_id,
            Duration::from_secs(config.send_timeout_secs),
        )
    }

    pub const fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    async fn send(&self, text: &str) -> Result<(), AlertError> {
        let Some(token) = self.token.as_deref() else {
            info!(message = %text, "[alert] no bot token, not sent");
            return Err(AlertError::NotConfigured);
        };

        let url = format!("{}/bot{token}/sendMessage", self.api_base);
        let resp = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: self.chat_id,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await
            // The URL embeds the token
            .map_err(|e| AlertError::Http(e.without_url()))?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| AlertError::Http(e.without_url()))?;
        confirm_delivery(status, &body)
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_not_delivered() {
        let ch = TelegramChannel::new("https://api.telegram.org", None, 1, Duration::from_secs(1)).unwrap();
        assert!(!ch.is_configured());
        assert!(matches!(ch.send("hi").await, Err(AlertError::NotConfigured)));
    }

    #[test]
    fn payload_uses_html_parse_mode() {
        let body = serde_json::to_value(SendMessage {
            chat_id: 42,
            text: "<b>x</b>",
            parse_mode: "HTML",
        })
        .unwrap();
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["parse_mode"], "HTML");
    }

    #[test]
    fn delivery_needs_ok_true() {
        assert!(confirm_delivery(reqwest::StatusCode::OK, br#"{"ok":true,"result":{}}"#).is_ok());

        match confirm_delivery(
            reqwest::StatusCode::OK,
            br#"{"ok":false,"description":"Bad Request: chat not found"}"#,
        ) {
            Err(AlertError::Refused(reason)) => assert!(reason.contains("chat not found")),
            other => panic!("expected refusal, got {other:?}"),
        }

        assert!(matches!(
            confirm_delivery(reqwest::StatusCode::OK, b"<html>"),
            Err(AlertError::Refused(_))
        ));
        assert!(matches!(
            confirm_delivery(reqwest::StatusCode::TOO_MANY_REQUESTS, br#"{"ok":false}"#),
            Err(AlertError::Rejected(reqwest::StatusCode::TOO_MANY_REQUESTS))
        ));
    }
}
