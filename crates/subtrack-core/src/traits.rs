//! Collaborator traits: the stores the core reads and writes, and the
//! capability every notification channel provides.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Subscription;

/// Owner of subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions with `isActive == true`.
    async fn list_active(&self) -> Result<Vec<Subscription>>;
    async fn get(&self, id: &str) -> Result<Option<Subscription>>;
    async fn put(&self, id: &str, subscription: &Subscription) -> Result<()>;
}

/// Shared counter store backing the rate limiter. Values expire after
/// `ttl_secs`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
}

/// Plain key-value store holding failure-log entries and their index.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// A notification channel (Telegram, webhook, email, ...).
///
/// Implementations report failures through `Err`; the dispatcher wraps every
/// sender so that nothing crosses the dispatch boundary except a success flag.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel name as listed in `enabled_notifiers`.
    fn name(&self) -> &str;

    /// Comma-separated global recipient list for channels that address
    /// individual recipients. `None` for broadcast channels.
    fn global_recipients(&self) -> Option<&str> {
        None
    }

    /// Deliver one message. `recipient` is only set for per-recipient channels.
    async fn send(&self, title: &str, body: &str, recipient: Option<&str>) -> Result<()>;
}
