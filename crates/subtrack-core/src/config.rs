//! SubTrack configuration system.
//!
//! The configuration is loaded once per invocation and passed around as an
//! immutable snapshot.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SubTrackError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubTrackConfig {
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl SubTrackConfig {
    /// Load config from the default path (~/.subtrack/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubTrackError::config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SubTrackError::config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubTrackError::config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the SubTrack home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".subtrack")
    }
}

fn bool_true() -> bool { true }

/// When and how far ahead reminders are produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Window used when a subscription has no `reminderDays`.
    #[serde(default = "default_window_days")]
    pub default_window_days: i64,
    /// Global "HH:mm" (or "HH") times at which reminders go out.
    #[serde(default)]
    pub reminder_times: Vec<String>,
    /// Offset of the operator's timezone from UTC.
    #[serde(default = "default_offset_minutes")]
    pub timezone_offset_minutes: i32,
}

fn default_window_days() -> i64 { 7 }
fn default_offset_minutes() -> i32 { 480 }

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
            reminder_times: Vec::new(),
            timezone_offset_minutes: default_offset_minutes(),
        }
    }
}

impl ReminderConfig {
    /// Configured timezone; out-of-range offsets fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        let offset = self
            .timezone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt);
        offset.unwrap_or_else(|| {
            tracing::warn!(
                "⚠️ Invalid timezone offset {} min, using UTC",
                self.timezone_offset_minutes
            );
            Utc.fix()
        })
    }

    /// `instant` expressed in the configured timezone.
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset())
    }
}

/// Which channels are used and how they are reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Names of the channels to attempt on every dispatch.
    #[serde(default)]
    pub enabled_notifiers: Vec<String>,
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
}

fn default_channel_timeout() -> u64 { 10 }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled_notifiers: Vec::new(),
            channel_timeout_secs: default_channel_timeout(),
            channels: Vec::new(),
        }
    }
}

impl NotificationConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs.max(1))
    }

    /// Settings for every enabled channel, in `enabled_notifiers` order.
    /// Names without a matching `[[notification.channels]]` entry are skipped.
    pub fn enabled_channels(&self) -> Vec<&ChannelSettings> {
        let mut enabled = Vec::new();
        for name in &self.enabled_notifiers {
            match self.channels.iter().find(|c| c.name() == name.as_str()) {
                Some(settings) => enabled.push(settings),
                None => tracing::warn!("⚠️ Notifier '{name}' is enabled but not configured"),
            }
        }
        enabled
    }
}

/// Channel-specific settings, one variant per channel type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelSettings {
    Telegram(TelegramSettings),
    Webhook(WebhookSettings),
    Bark(BarkSettings),
    Wechat(WechatBotSettings),
    Email(EmailSettings),
    PushRelay(PushRelaySettings),
}

impl ChannelSettings {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelSettings::Telegram(_) => "telegram",
            ChannelSettings::Webhook(_) => "webhook",
            ChannelSettings::Bark(_) => "bark",
            ChannelSettings::Wechat(_) => "wechat",
            ChannelSettings::Email(_) => "email",
            ChannelSettings::PushRelay(_) => "push_relay",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body template; `{{title}}`, `{{content}}` and `{{timestamp}}` are
    /// substituted. A JSON object with those fields is sent when unset.
    #[serde(default)]
    pub template: Option<String>,
    /// When set, the body is signed with HMAC-SHA256 (`X-Signature` header).
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_method() -> String { "POST".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarkSettings {
    #[serde(default = "default_bark_server")]
    pub server: String,
    pub device_key: String,
    #[serde(default)]
    pub save_history: bool,
}

fn default_bark_server() -> String { "https://api.day.app".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatBotSettings {
    pub webhook_url: String,
    /// "text" or "markdown".
    #[serde(default = "default_msg_type")]
    pub msg_type: String,
    #[serde(default)]
    pub at_mobiles: Vec<String>,
    #[serde(default)]
    pub at_all: bool,
}

fn default_msg_type() -> String { "text".into() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRelaySettings {
    pub url: String,
    #[serde(default)]
    pub token: String,
    /// Comma-separated global recipient ids.
    #[serde(default)]
    pub user_ids: String,
    #[serde(default = "bool_true")]
    pub markdown: bool,
}

/// Where persistent state lives and how long a store round trip may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// Auto-renewal writes issued concurrently per batch.
    #[serde(default = "default_renew_batch")]
    pub renew_batch_size: usize,
}

fn default_db_path() -> String { "~/.subtrack/subtrack.db".into() }
fn default_store_timeout() -> u64 { 5 }
fn default_renew_batch() -> usize { 4 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            store_timeout_secs: default_store_timeout(),
            renew_batch_size: default_renew_batch(),
        }
    }
}

impl StorageConfig {
    /// `db_path` with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs.max(1))
    }
}

/// Limits for abuse-prone actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_login_policy")]
    pub login: RateLimitPolicy,
    #[serde(default = "default_test_notify_policy")]
    pub test_notify: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: default_login_policy(),
            test_notify: default_test_notify_policy(),
        }
    }
}

/// `max_requests` per fixed window of `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u64,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.max(1))
    }
}

fn default_login_policy() -> RateLimitPolicy {
    RateLimitPolicy { max_requests: 5, window_secs: 900 }
}
fn default_test_notify_policy() -> RateLimitPolicy {
    RateLimitPolicy { max_requests: 3, window_secs: 60 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SubTrackConfig::default();
        assert_eq!(config.reminder.default_window_days, 7);
        assert_eq!(config.reminder.timezone_offset_minutes, 480);
        assert_eq!(config.notification.channel_timeout_secs, 10);
        assert!(config.notification.enabled_notifiers.is_empty());
        assert_eq!(config.rate_limit.login.max_requests, 5);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = SubTrackConfig::parse("").unwrap();
        assert_eq!(config.storage.renew_batch_size, 4);
        assert_eq!(config.storage.store_timeout_secs, 5);
    }

    #[test]
    fn test_tagged_channels_from_toml() {
        let toml_str = r#"
            [reminder]
            default_window_days = 3
            reminder_times = ["08:00", "20"]

            [notification]
            enabled_notifiers = ["telegram", "push_relay", "bark"]

            [[notification.channels]]
            type = "telegram"
            bot_token = "123:abc"
            chat_id = "42"

            [[notification.channels]]
            type = "push_relay"
            url = "https://relay.example/send"
            user_ids = "a,b"
        "#;
        let config = SubTrackConfig::parse(toml_str).unwrap();
        assert_eq!(config.reminder.default_window_days, 3);
        assert_eq!(config.reminder.reminder_times.len(), 2);

        // "bark" is enabled but has no settings, so it is skipped.
        let enabled = config.notification.enabled_channels();
        assert_eq!(enabled.len(), 2);
        assert_eq!(enabled[0].name(), "telegram");
        match enabled[1] {
            ChannelSettings::PushRelay(p) => assert_eq!(p.user_ids, "a,b"),
            other => panic!("unexpected channel {other:?}"),
        }
    }

    #[test]
    fn test_unknown_channel_type_rejected() {
        let toml_str = r#"
            [[notification.channels]]
            type = "carrier_pigeon"
        "#;
        assert!(SubTrackConfig::parse(toml_str).is_err());
    }

    #[test]
    fn test_offset_and_localize() {
        let reminder = ReminderConfig::default();
        let utc = DateTime::parse_from_rfc3339("2024-02-09T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let local = reminder.localize(utc);
        assert_eq!(local.date_naive().to_string(), "2024-02-10");
    }

    #[test]
    fn test_invalid_offset_falls_back_to_utc() {
        for minutes in [100_000, i32::MAX, i32::MIN] {
            let reminder = ReminderConfig { timezone_offset_minutes: minutes, ..Default::default() };
            assert_eq!(reminder.offset().local_minus_utc(), 0);
        }
    }

    #[test]
    fn test_home_dir() {
        let home = SubTrackConfig::home_dir();
        assert!(home.to_string_lossy().contains("subtrack"));
    }
}
