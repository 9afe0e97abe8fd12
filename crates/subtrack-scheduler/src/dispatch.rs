//! Notification dispatch: fan one message out to every enabled channel.
//!
//! Every channel is wrapped in a [`GuardedSender`] so that a timeout, an
//! error or even a panic inside a sender is reduced to `false`. Channels run
//! concurrently; a dispatch always completes and always reports one outcome
//! per attempted channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use subtrack_core::config::NotificationConfig;
use subtrack_core::{ChannelOutcome, ChannelSender, FailureLogEntry, ReminderDecision};

use crate::audit::FailureLog;
use crate::notify::ReminderFormatter;
use crate::recipients::{distribute, split_ids};

/// Adapter that turns any sender failure mode into a boolean.
#[derive(Clone)]
pub struct GuardedSender {
    inner: Arc<dyn ChannelSender>,
    timeout: Duration,
}

impl GuardedSender {
    pub fn new(inner: Arc<dyn ChannelSender>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Deliver one message; never fails, never panics.
    pub async fn send(&self, title: &str, body: &str, recipient: Option<&str>) -> bool {
        let attempt = AssertUnwindSafe(self.inner.send(title, body, recipient)).catch_unwind();
        let target = recipient.unwrap_or("*");
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!("✅ [{}] delivered to {target}", self.name());
                true
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!("❌ [{}] failed for {target}: {e}", self.name());
                false
            }
            Ok(Err(_)) => {
                tracing::error!("💥 [{}] sender panicked for {target}", self.name());
                false
            }
            Err(_) => {
                tracing::warn!(
                    "⏱️ [{}] timed out after {:?} for {target}",
                    self.name(),
                    self.timeout
                );
                false
            }
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<ChannelOutcome>,
    /// Failure log id, when an entry was written.
    pub audit_id: Option<u64>,
}

impl DispatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn any_failed(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Sends one logical notification through every enabled channel.
pub struct NotificationDispatcher {
    senders: Vec<GuardedSender>,
    audit: Option<FailureLog>,
}

impl NotificationDispatcher {
    /// Keep the senders named in `config.enabled_notifiers`, in that order.
    /// Names with no matching sender are skipped with a warning.
    pub fn new(available: Vec<Arc<dyn ChannelSender>>, config: &NotificationConfig) -> Self {
        let timeout = config.channel_timeout();
        let mut senders = Vec::new();
        for name in &config.enabled_notifiers {
            match available.iter().find(|s| s.name() == name) {
                Some(sender) => senders.push(GuardedSender::new(sender.clone(), timeout)),
                None => tracing::warn!("⚠️ Notifier '{name}' is enabled but not configured"),
            }
        }
        Self { senders, audit: None }
    }

    /// Record dispatches with failed channels in `log`.
    pub fn with_audit(mut self, log: FailureLog) -> Self {
        self.audit = Some(log);
        self
    }

    /// Override the per-channel timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        for s in &mut self.senders {
            s.timeout = timeout;
        }
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.senders.iter().map(|s| s.name()).collect()
    }

    /// Send a free-form message (no per-subscription recipient routing).
    pub async fn dispatch(&self, title: &str, body: &str, tag: Option<&str>) -> DispatchReport {
        self.deliver(title, body, None, tag).await
    }

    /// Send a reminder for `decisions` rendered by `formatter`. Per-recipient
    /// channels receive one message per recipient, built from only the
    /// decisions addressed to them.
    pub async fn dispatch_reminders(
        &self,
        formatter: &ReminderFormatter,
        decisions: &[ReminderDecision],
        tag: Option<&str>,
    ) -> DispatchReport {
        let (title, body) = formatter.render(decisions);
        self.deliver(&title, &body, Some((formatter, decisions)), tag).await
    }

    async fn deliver(
        &self,
        title: &str,
        body: &str,
        reminders: Option<(&ReminderFormatter, &[ReminderDecision])>,
        tag: Option<&str>,
    ) -> DispatchReport {
        if self.senders.is_empty() {
            tracing::info!("🔕 No notifiers enabled, skipping '{title}'");
            return DispatchReport::default();
        }

        let attempts = self
            .senders
            .iter()
            .map(|sender| self.attempt(sender, title, body, reminders));
        let outcomes = join_all(attempts).await;

        let mut report = DispatchReport { outcomes, audit_id: None };
        tracing::info!(
            "📣 '{title}': {} ok, {} failed",
            report.successes().count(),
            report.failures().count()
        );
        if report.any_failed() {
            report.audit_id = self.record_failure(&report, title, tag).await;
        }
        report
    }

    async fn attempt(
        &self,
        sender: &GuardedSender,
        title: &str,
        body: &str,
        reminders: Option<(&ReminderFormatter, &[ReminderDecision])>,
    ) -> ChannelOutcome {
        let success = match (sender.inner.global_recipients(), reminders) {
            (Some(global), Some((formatter, decisions))) if !decisions.is_empty() => {
                let groups = distribute(decisions, global);
                let sends = groups.iter().map(|(recipient, group)| {
                    let body = formatter.body(group.iter().copied());
                    let recipient = (!recipient.is_empty()).then_some(recipient.as_str());
                    async move { sender.send(title, &body, recipient).await }
                });
                join_all(sends).await.into_iter().all(|ok| ok)
            }
            (Some(global), _) => {
                let ids = split_ids(global);
                if ids.is_empty() {
                    sender.send(title, body, None).await
                } else {
                    let sends = ids.iter().map(|id| sender.send(title, body, Some(id)));
                    join_all(sends).await.into_iter().all(|ok| ok)
                }
            }
            (None, _) => sender.send(title, body, None).await,
        };
        ChannelOutcome { channel: sender.name().to_string(), success }
    }

    async fn record_failure(&self, report: &DispatchReport, title: &str, tag: Option<&str>) -> Option<u64> {
        let log = self.audit.as_ref()?;
        let entry = FailureLogEntry {
            timestamp: Utc::now(),
            title: title.to_string(),
            tag: tag.map(str::to_string),
            failures: report.failures().cloned().collect(),
            successes: report.successes().cloned().collect(),
        };
        match log.append(&entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("⚠️ Could not record failed dispatch '{title}': {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use subtrack_core::{Result, SubTrackError, Subscription};

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct StubSender {
        name: String,
        behaviour: Behaviour,
        global: Option<String>,
        sent: Mutex<Vec<(Option<String>, String)>>,
    }

    impl StubSender {
        fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                behaviour,
                global: None,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn per_recipient(name: &str, global: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                behaviour: Behaviour::Succeed,
                global: Some(global.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(Option<String>, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelSender for StubSender {
        fn name(&self) -> &str {
            &self.name
        }

        fn global_recipients(&self) -> Option<&str> {
            self.global.as_deref()
        }

        async fn send(&self, _title: &str, body: &str, recipient: Option<&str>) -> Result<()> {
            match self.behaviour {
                Behaviour::Succeed => {
                    self.sent
                        .lock()
                        .unwrap()
                        .push((recipient.map(str::to_string), body.to_string()));
                    Ok(())
                }
                Behaviour::Fail => Err(SubTrackError::channel("HTTP 500")),
                Behaviour::Panic => panic!("sender bug"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
            }
        }
    }

    fn config(names: &[&str]) -> NotificationConfig {
        NotificationConfig {
            enabled_notifiers: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn decision(id: &str, recipients: Option<&str>) -> ReminderDecision {
        let mut sub = Subscription::new(id, id, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        sub.notify_recipients = recipients.map(str::to_string);
        ReminderDecision { subscription: sub, days_until: 2 }
    }

    #[tokio::test]
    async fn test_partial_failure_is_audited() {
        let store = Arc::new(MemoryStore::default());
        let log = FailureLog::new(store.clone());
        let senders: Vec<Arc<dyn ChannelSender>> = vec![
            StubSender::new("telegram", Behaviour::Fail),
            StubSender::new("bark", Behaviour::Succeed),
        ];
        let dispatcher =
            NotificationDispatcher::new(senders, &config(&["telegram", "bark"])).with_audit(log.clone());

        let report = dispatcher.dispatch("Test", "hello", Some("test")).await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.audit_id, Some(1));

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].failures[0].channel, "telegram");
        assert_eq!(recent[0].successes[0].channel, "bark");
        assert_eq!(recent[0].tag.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn test_all_success_writes_no_audit() {
        let store = Arc::new(MemoryStore::default());
        let log = FailureLog::new(store.clone());
        let senders: Vec<Arc<dyn ChannelSender>> = vec![StubSender::new("bark", Behaviour::Succeed)];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["bark"])).with_audit(log.clone());

        let report = dispatcher.dispatch("Test", "hello", None).await;
        assert!(!report.any_failed());
        assert!(report.audit_id.is_none());
        assert!(log.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panic_and_timeout_become_failures() {
        let senders: Vec<Arc<dyn ChannelSender>> = vec![
            StubSender::new("panicky", Behaviour::Panic),
            StubSender::new("slow", Behaviour::Hang),
            StubSender::new("ok", Behaviour::Succeed),
        ];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["panicky", "slow", "ok"]))
            .with_timeout(Duration::from_millis(50));

        let report = dispatcher.dispatch("T", "B", None).await;
        let flags: Vec<(String, bool)> = report
            .outcomes
            .iter()
            .map(|o| (o.channel.clone(), o.success))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("panicky".to_string(), false),
                ("slow".to_string(), false),
                ("ok".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_no_enabled_channels_is_noop() {
        let store = Arc::new(MemoryStore::default());
        let log = FailureLog::new(store.clone());
        let senders: Vec<Arc<dyn ChannelSender>> = vec![StubSender::new("bark", Behaviour::Fail)];
        let dispatcher = NotificationDispatcher::new(senders, &config(&[])).with_audit(log.clone());

        let report = dispatcher.dispatch("T", "B", None).await;
        assert!(report.outcomes.is_empty());
        assert!(log.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_enabled_name_is_skipped() {
        let senders: Vec<Arc<dyn ChannelSender>> = vec![StubSender::new("bark", Behaviour::Succeed)];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["email", "bark"]));
        assert_eq!(dispatcher.channel_names(), vec!["bark"]);
    }

    #[tokio::test]
    async fn test_per_recipient_fan_out() {
        let relay = StubSender::per_recipient("push_relay", "u1,u2");
        let senders: Vec<Arc<dyn ChannelSender>> = vec![relay.clone()];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["push_relay"]));

        let decisions = vec![decision("shared", None), decision("private", Some("u3"))];
        let report = dispatcher
            .dispatch_reminders(&ReminderFormatter::default(), &decisions, None)
            .await;
        assert!(!report.any_failed());

        let mut sent = relay.sent();
        sent.sort();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].0.as_deref(), Some("u1"));
        assert!(sent[0].1.contains("shared") && !sent[0].1.contains("private"));
        assert_eq!(sent[2].0.as_deref(), Some("u3"));
        assert!(sent[2].1.contains("private") && !sent[2].1.contains("shared"));
    }

    #[tokio::test]
    async fn test_broadcast_channel_gets_full_body() {
        let bark = StubSender::new("bark", Behaviour::Succeed);
        let senders: Vec<Arc<dyn ChannelSender>> = vec![bark.clone()];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["bark"]));
        let formatter = ReminderFormatter::default();

        let decisions = [decision("a", Some("u3")), decision("b", None)];
        dispatcher.dispatch_reminders(&formatter, &decisions, None).await;
        assert_eq!(bark.sent(), vec![(None, formatter.body(&decisions))]);
    }

    #[tokio::test]
    async fn test_per_recipient_and_broadcast_bodies_share_formatter() {
        let bark = StubSender::new("bark", Behaviour::Succeed);
        let relay = StubSender::per_recipient("push_relay", "u1");
        let senders: Vec<Arc<dyn ChannelSender>> = vec![bark.clone(), relay.clone()];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["bark", "push_relay"]));
        let formatter = ReminderFormatter { title: "Due soon".into(), show_lunar: false };

        let mut lunar = decision("festival", None);
        lunar.subscription.use_lunar = true;
        dispatcher.dispatch_reminders(&formatter, &[lunar], None).await;

        let broadcast = bark.sent();
        let addressed = relay.sent();
        assert_eq!(broadcast.len(), 1);
        assert_eq!(addressed, vec![(Some("u1".to_string()), broadcast[0].1.clone())]);
        assert!(!addressed[0].1.contains("lunar"));
    }

    #[tokio::test]
    async fn test_free_form_message_to_global_recipients() {
        let relay = StubSender::per_recipient("push_relay", "u1, u2");
        let senders: Vec<Arc<dyn ChannelSender>> = vec![relay.clone()];
        let dispatcher = NotificationDispatcher::new(senders, &config(&["push_relay"]));

        dispatcher.dispatch("T", "ping", None).await;
        let mut to: Vec<Option<String>> = relay.sent().into_iter().map(|(r, _)| r).collect();
        to.sort();
        assert_eq!(to, vec![Some("u1".to_string()), Some("u2".to_string())]);
    }
}
