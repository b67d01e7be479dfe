//! Telegram Bot API transport.

use async_trait::async_trait;
use report_pipeline::{MessageTransport, TransportError};
use tracing::info;

use crate::config::TelegramConfig;

/// Posts chunks with `sendMessage`.
pub struct TelegramTransport {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let form = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", text),
            ("parse_mode", self.config.parse_mode.as_str()),
        ];

        // The URL embeds the bot token, keep it out of error messages
        let response = self
            .http
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Dry-run transport: logs chunks instead of sending them.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        info!(chars = text.chars().count(), "[dry-run] chunk:\n{}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
