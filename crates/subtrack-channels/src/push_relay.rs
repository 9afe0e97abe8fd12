//! Per-recipient push relay. One request per recipient id; the dispatcher
//! groups reminders so each recipient only sees their own subscriptions.

use async_trait::async_trait;
use subtrack_core::config::PushRelaySettings;
use subtrack_core::{ChannelSender, Result, SubTrackError};

use crate::{read_success, transport};

pub struct PushRelaySender {
    settings: PushRelaySettings,
    client: reqwest::Client,
}

impl PushRelaySender {
    pub fn new(settings: PushRelaySettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    pub fn payload(&self, title: &str, body: &str, recipient: Option<&str>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "title": title,
            "content": body,
            "markdown": self.settings.markdown,
        });
        if let Some(user) = recipient {
            payload["user_id"] = serde_json::json!(user);
        }
        payload
    }
}

#[async_trait]
impl ChannelSender for PushRelaySender {
    fn name(&self) -> &str {
        "push_relay"
    }

    fn global_recipients(&self) -> Option<&str> {
        Some(&self.settings.user_ids)
    }

    async fn send(&self, title: &str, body: &str, recipient: Option<&str>) -> Result<()> {
        if self.settings.url.is_empty() {
            return Err(SubTrackError::channel("push_relay: url is required"));
        }
        let mut request = self.client.post(&self.settings.url);
        if !self.settings.token.is_empty() {
            request = request.bearer_auth(&self.settings.token);
        }
        let response = request
            .json(&self.payload(title, body, recipient))
            .send()
            .await
            .map_err(transport("push_relay"))?;
        read_success("push_relay", response).await?;
        Ok(())
    }
}
