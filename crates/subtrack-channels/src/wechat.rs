//! WeChat Work group-bot channel (`msgtype` text or markdown).

use async_trait::async_trait;
use serde::Deserialize;
use subtrack_core::config::WechatBotSettings;
use subtrack_core::{ChannelSender, Result, SubTrackError};

use crate::{read_success, transport};

#[derive(Debug, Deserialize)]
struct WechatResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

pub struct WechatBotSender {
    settings: WechatBotSettings,
    client: reqwest::Client,
}

impl WechatBotSender {
    pub fn new(settings: WechatBotSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    pub fn payload(&self, title: &str, body: &str) -> serde_json::Value {
        if self.settings.msg_type.eq_ignore_ascii_case("markdown") {
            return serde_json::json!({
                "msgtype": "markdown",
                "markdown": { "content": format!("**{title}**\n\n{body}") },
            });
        }
        let mut mentions = self.settings.at_mobiles.clone();
        if self.settings.at_all {
            mentions.push("@all".into());
        }
        serde_json::json!({
            "msgtype": "text",
            "text": {
                "content": format!("{title}\n\n{body}"),
                "mentioned_mobile_list": mentions,
            },
        })
    }
}

#[async_trait]
impl ChannelSender for WechatBotSender {
    fn name(&self) -> &str {
        "wechat"
    }

    async fn send(&self, title: &str, body: &str, _recipient: Option<&str>) -> Result<()> {
        if self.settings.webhook_url.is_empty() {
            return Err(SubTrackError::channel("wechat: webhook_url is required"));
        }
        let response = self
            .client
            .post(&self.settings.webhook_url)
            .json(&self.payload(title, body))
            .send()
            .await
            .map_err(transport("wechat"))?;
        let raw = read_success("wechat", response).await?;
        let result: WechatResponse = serde_json::from_str(&raw)
            .map_err(|e| SubTrackError::channel(format!("Invalid WeChat response: {e}")))?;
        if result.errcode != 0 {
            return Err(SubTrackError::channel(format!(
                "WeChat error {}: {}",
                result.errcode, result.errmsg
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(msg_type: &str) -> WechatBotSettings {
        WechatBotSettings {
            webhook_url: "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=k".into(),
            msg_type: msg_type.into(),
            at_mobiles: vec!["13800000000".into()],
            at_all: true,
        }
    }

    #[test]
    fn test_text_payload_mentions() {
        let p = WechatBotSender::new(settings("text"), reqwest::Client::new()).payload("Due", "VPS");
        assert_eq!(p["msgtype"], "text");
        assert_eq!(p["text"]["content"], "Due\n\nVPS");
        assert_eq!(p["text"]["mentioned_mobile_list"], serde_json::json!(["13800000000", "@all"]));
    }

    #[test]
    fn test_markdown_payload() {
        let p = WechatBotSender::new(settings("Markdown"), reqwest::Client::new()).payload("Due", "VPS");
        assert_eq!(p["msgtype"], "markdown");
        assert_eq!(p["markdown"]["content"], "**Due**\n\nVPS");
    }
}
