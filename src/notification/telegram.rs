//! A client for sending notifications through the Telegram Bot API.

use crate::config::TelegramConfig;
use crate::core::Notifier;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Sends each message as a `sendMessage` call to a single chat.
pub struct TelegramClient {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramClient {
    /// Creates a new `TelegramClient`.
    pub fn new(api_base_url: &str, bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base_url.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.to_string(),
        })
    }

    /// Builds a client from validated configuration.
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .as_deref()
            .ok_or_else(|| anyhow!("Telegram bot token is not configured"))?;
        let chat_id = config
            .chat_id
            .as_deref()
            .ok_or_else(|| anyhow!("Telegram chat id is not configured"))?;
        Self::new(
            &config.api_base_url,
            bot_token,
            chat_id,
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    #[instrument(skip_all, fields(len = text.len()))]
    async fn deliver(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await
            // reqwest errors embed the URL, which contains the bot token.
            .map_err(|e| e.without_url())?;

        let status = response.status();
        if status.is_success() {
            debug!("Delivered Telegram message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Telegram API rejected message");
        anyhow::bail!("Telegram API returned status {}", status)
    }
}
