//! Telegram Bot channel — sends reminders via the Bot API `sendMessage`.

use async_trait::async_trait;
use serde::Deserialize;
use subtrack_core::config::TelegramSettings;
use subtrack_core::{ChannelSender, Result, SubTrackError};

use crate::{read_success, transport};

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot sender.
pub struct TelegramSender {
    settings: TelegramSettings,
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new(settings: TelegramSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.bot_token
        )
    }

    /// `sendMessage` request body.
    pub fn payload(&self, title: &str, body: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.settings.chat_id,
            "text": format!("*{}*\n\n{}", escape_markdown(title), escape_markdown(body)),
            "parse_mode": "Markdown",
        })
    }
}

/// Escape Telegram Markdown (v1) special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, title: &str, body: &str, _recipient: Option<&str>) -> Result<()> {
        if self.settings.bot_token.is_empty() || self.settings.chat_id.is_empty() {
            return Err(SubTrackError::channel("telegram: bot_token and chat_id are required"));
        }
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&self.payload(title, body))
            .send()
            .await
            .map_err(transport("telegram"))?;
        let raw = read_success("telegram", response).await?;

        let result: TelegramApiResponse = serde_json::from_str(&raw)
            .map_err(|e| SubTrackError::channel(format!("Invalid Telegram response: {e}")))?;
        if !result.ok {
            return Err(SubTrackError::channel(format!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}
