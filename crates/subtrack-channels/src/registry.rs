//! Build senders from configuration.

use std::sync::Arc;

use subtrack_core::ChannelSender;
use subtrack_core::config::{ChannelSettings, NotificationConfig};

use crate::bark::BarkSender;
use crate::email::EmailSender;
use crate::push_relay::PushRelaySender;
use crate::telegram::TelegramSender;
use crate::webhook::WebhookSender;
use crate::wechat::WechatBotSender;

/// One sender per enabled channel, in `enabled_notifiers` order. HTTP
/// channels share `client`.
pub fn build_senders(config: &NotificationConfig, client: reqwest::Client) -> Vec<Arc<dyn ChannelSender>> {
    config
        .enabled_channels()
        .into_iter()
        .map(|settings| build_sender(settings, client.clone()))
        .collect()
}

pub fn build_sender(settings: &ChannelSettings, client: reqwest::Client) -> Arc<dyn ChannelSender> {
    match settings {
        ChannelSettings::Telegram(s) => Arc::new(TelegramSender::new(s.clone(), client)),
        ChannelSettings::Webhook(s) => Arc::new(WebhookSender::new(s.clone(), client)),
        ChannelSettings::Bark(s) => Arc::new(BarkSender::new(s.clone(), client)),
        ChannelSettings::Wechat(s) => Arc::new(WechatBotSender::new(s.clone(), client)),
        ChannelSettings::Email(s) => Arc::new(EmailSender::new(s.clone())),
        ChannelSettings::PushRelay(s) => Arc::new(PushRelaySender::new(s.clone(), client)),
    }
}
