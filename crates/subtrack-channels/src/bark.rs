//! Bark (iOS push) channel.

use async_trait::async_trait;
use serde::Deserialize;
use subtrack_core::config::BarkSettings;
use subtrack_core::{ChannelSender, Result, SubTrackError};

use crate::{read_success, transport};

#[derive(Debug, Deserialize)]
struct BarkResponse {
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct BarkSender {
    settings: BarkSettings,
    client: reqwest::Client,
}

impl BarkSender {
    pub fn new(settings: BarkSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/push", self.settings.server.trim_end_matches('/'))
    }

    pub fn payload(&self, title: &str, body: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "device_key": self.settings.device_key,
            "title": title,
            "body": body,
            "group": "subtrack",
        });
        if self.settings.save_history {
            payload["isArchive"] = serde_json::json!("1");
        }
        payload
    }
}

#[async_trait]
impl ChannelSender for BarkSender {
    fn name(&self) -> &str {
        "bark"
    }

    async fn send(&self, title: &str, body: &str, _recipient: Option<&str>) -> Result<()> {
        if self.settings.device_key.is_empty() {
            return Err(SubTrackError::channel("bark: device_key is required"));
        }
        let response = self
            .client
            .post(self.endpoint())
            .json(&self.payload(title, body))
            .send()
            .await
            .map_err(transport("bark"))?;
        let raw = read_success("bark", response).await?;
        let result: BarkResponse = serde_json::from_str(&raw)
            .map_err(|e| SubTrackError::channel(format!("Invalid Bark response: {e}")))?;
        if result.code != 200 {
            return Err(SubTrackError::channel(format!("Bark error {}: {}", result.code, result.message)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(save_history: bool) -> BarkSender {
        BarkSender::new(
            BarkSettings {
                server: "https://api.day.app/".into(),
                device_key: "KEY".into(),
                save_history,
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_payload() {
        let s = sender(false);
        assert_eq!(s.endpoint(), "https://api.day.app/push");
        let p = s.payload("Due", "VPS");
        assert_eq!(p["device_key"], "KEY");
        assert!(p.get("isArchive").is_none());
        assert_eq!(sender(true).payload("a", "b")["isArchive"], "1");
    }
}
