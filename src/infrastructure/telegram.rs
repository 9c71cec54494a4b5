//! Messaging adapters: Telegram Bot API, and a tracing-only fallback.

use crate::domain::ports::Messenger;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends HTML messages through the Telegram Bot API `sendMessage` method.
#[derive(Clone)]
pub struct TelegramMessenger {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramMessenger {
    pub fn new(bot_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FulfillmentError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_base: TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
        })
    }

    /// Points the client at another Bot API server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, channel_id: &str, html: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: channel_id,
            text: html,
            parse_mode: "HTML",
        };
        let response = self
            .http
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| FulfillmentError::NotificationDeliveryFailed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FulfillmentError::NotificationDeliveryFailed(format!(
                "telegram answered {status} for chat {channel_id}"
            )));
        }
        debug!(chat_id = channel_id, "telegram message sent");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them; used when no bot token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, channel_id: &str, html: &str) -> Result<()> {
        info!(channel = channel_id, message = %html, "notification");
        Ok(())
    }
}
