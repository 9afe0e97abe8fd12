//! Generic HTTP webhook channel with optional HMAC-SHA256 signing.
//!
//! The body is either the configured template with `{{title}}`,
//! `{{content}}` and `{{timestamp}}` substituted (values JSON-escaped), or a
//! JSON object carrying those three fields. When a secret is configured the
//! request carries `X-Timestamp` and `X-Signature`, the latter being the
//! base64 HMAC-SHA256 of `"{timestamp}.{body}"`.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use sha2::Sha256;
use subtrack_core::config::WebhookSettings;
use subtrack_core::{ChannelSender, Result, SubTrackError};

use crate::{read_success, transport};

type HmacSha256 = Hmac<Sha256>;

/// Webhook sender.
pub struct WebhookSender {
    settings: WebhookSettings,
    client: reqwest::Client,
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Base64 HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign(secret: &str, timestamp: i64, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SubTrackError::channel(format!("webhook: bad secret: {e}")))?;
    mac.update(format!("{timestamp}.{body}").as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

impl WebhookSender {
    pub fn new(settings: WebhookSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    /// Request body for one message.
    pub fn render_body(&self, title: &str, content: &str, timestamp: &str) -> String {
        match &self.settings.template {
            Some(template) => template
                .replace("{{title}}", &json_escape(title))
                .replace("{{content}}", &json_escape(content))
                .replace("{{timestamp}}", &json_escape(timestamp)),
            None => serde_json::json!({
                "title": title,
                "content": content,
                "timestamp": timestamp,
            })
            .to_string(),
        }
    }

    fn method(&self) -> Result<Method> {
        Method::from_bytes(self.settings.method.trim().to_uppercase().as_bytes())
            .map_err(|_| SubTrackError::channel(format!("webhook: bad method '{}'", self.settings.method)))
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, title: &str, body: &str, _recipient: Option<&str>) -> Result<()> {
        if self.settings.url.is_empty() {
            return Err(SubTrackError::channel("webhook: url is required"));
        }
        let now = Utc::now();
        let payload = self.render_body(title, body, &now.to_rfc3339());

        let mut request = self
            .client
            .request(self.method()?, &self.settings.url)
            .header(CONTENT_TYPE, "application/json");
        for (key, value) in &self.settings.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(secret) = self.settings.secret.as_deref().filter(|s| !s.is_empty()) {
            let ts = now.timestamp();
            request = request
                .header("X-Timestamp", ts.to_string())
                .header("X-Signature", sign(secret, ts, &payload)?);
        }

        let response = request.body(payload).send().await.map_err(transport("webhook"))?;
        read_success("webhook", response).await?;
        Ok(())
    }
}
