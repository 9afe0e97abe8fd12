//! Reminder engine: one tick = scan, filter by time of day, format, dispatch.
//! The periodic loop uses `tokio::time::interval` and sleeps between ticks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use subtrack_core::config::ReminderConfig;
use subtrack_core::{ReminderDecision, Result, SubTrackConfig, SubTrackError, SubscriptionStore};

use crate::dispatch::{DispatchReport, NotificationDispatcher};
use crate::notify::{ReminderFormatter, filter_by_time};
use crate::rate_limit::RateLimiter;
use crate::scanner::{DueDateScanner, ScanOptions};

/// Tag stored with failure-log entries of scheduled reminders.
pub const SCHEDULED_TAG: &str = "scheduled";
/// Tag stored with failure-log entries of manual test messages.
pub const TEST_TAG: &str = "test";

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub local_time: DateTime<FixedOffset>,
    /// Decisions produced by the scan, before time-of-day filtering.
    pub due: usize,
    /// Decisions that were sent.
    pub notified: Vec<ReminderDecision>,
    pub dispatch: Option<DispatchReport>,
}

/// Scanner, formatter and dispatcher for one configuration snapshot.
pub struct ReminderEngine {
    scanner: DueDateScanner,
    dispatcher: NotificationDispatcher,
    formatter: ReminderFormatter,
    reminder: ReminderConfig,
}

impl ReminderEngine {
    pub fn new(
        config: &SubTrackConfig,
        store: Arc<dyn SubscriptionStore>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            scanner: DueDateScanner::new(store, ScanOptions::from_config(config)),
            dispatcher,
            formatter: ReminderFormatter::default(),
            reminder: config.reminder.clone(),
        }
    }

    /// Run one reminder pass at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let local = self.reminder.localize(now);
        let decisions = self.scanner.scan(local.date_naive(), now).await?;
        let due = decisions.len();
        let notified = filter_by_time(decisions, local.time(), &self.reminder.reminder_times);

        if notified.is_empty() {
            tracing::debug!("⏰ Tick {}: {due} due, none at this time", local.format("%Y-%m-%d %H:%M"));
            return Ok(TickReport { local_time: local, due, notified, dispatch: None });
        }

        let report = self
            .dispatcher
            .dispatch_reminders(&self.formatter, &notified, Some(SCHEDULED_TAG))
            .await;
        Ok(TickReport { local_time: local, due, notified, dispatch: Some(report) })
    }

    /// Send a test message through every enabled channel, counted against
    /// `limiter` under `identifier`.
    pub async fn test_notify(&self, limiter: &RateLimiter, identifier: &str) -> Result<DispatchReport> {
        let check = limiter.check(identifier).await?;
        if check.limited {
            let wait = DateTime::<Utc>::from_timestamp_millis(check.reset_time)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            return Err(SubTrackError::RateLimited(format!(
                "test notifications for '{identifier}' blocked until {wait}"
            )));
        }
        let body = format!(
            "This is a test message sent at {}.",
            self.reminder.localize(Utc::now()).format("%Y-%m-%d %H:%M:%S")
        );
        Ok(self
            .dispatcher
            .dispatch("🔔 SubTrack test notification", &body, Some(TEST_TAG))
            .await)
    }
}

/// Call `tick` every `interval_secs` until the task is dropped. Tick errors
/// are logged and the loop keeps going.
pub async fn run_every<F, Fut>(interval_secs: u64, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TickReport>>,
{
    tracing::info!("⏰ Reminder loop started (every {interval_secs}s)");
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match tick().await {
            Ok(report) => {
                for d in &report.notified {
                    tracing::info!("📣 [{}] {} day(s)", d.subscription.name, d.days_until);
                }
            }
            Err(e) => tracing::error!("❌ Reminder tick failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::FailureLog;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Mutex;
    use subtrack_core::config::{NotificationConfig, RateLimitPolicy};
    use subtrack_core::{ChannelSender, Subscription};

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChannelSender for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn send(&self, title: &str, body: &str, _recipient: Option<&str>) -> Result<()> {
            self.messages.lock().unwrap().push((title.into(), body.into()));
            Ok(())
        }
    }

    fn setup(subs: Vec<Subscription>, times: &[&str]) -> (ReminderEngine, Arc<Recorder>, Arc<MemoryStore>) {
        let mut config = SubTrackConfig::default();
        config.reminder.timezone_offset_minutes = 0;
        config.reminder.reminder_times = times.iter().map(|t| t.to_string()).collect();
        config.notification = NotificationConfig {
            enabled_notifiers: vec!["recorder".into()],
            ..Default::default()
        };
        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(MemoryStore::with_subscriptions(subs));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![recorder.clone()];
        let dispatcher = NotificationDispatcher::new(senders, &config.notification)
            .with_audit(FailureLog::new(store.clone()));
        let engine = ReminderEngine::new(&config, store.clone(), dispatcher);
        (engine, recorder, store)
    }

    fn due_soon(id: &str) -> Subscription {
        let mut s = Subscription::new(id, id, NaiveDate::from_ymd_opt(2024, 3, 18).unwrap());
        s.reminder_days = Some(7);
        s
    }

    #[tokio::test]
    async fn test_tick_sends_at_reminder_time() {
        let (engine, recorder, _) = setup(vec![due_soon("vps")], &["08:00"]);
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap();

        let report = engine.tick(now).await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.notified.len(), 1);
        let messages = recorder.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("vps"));
    }

    #[tokio::test]
    async fn test_tick_outside_reminder_time_sends_nothing() {
        let (engine, recorder, _) = setup(vec![due_soon("vps")], &["08:00"]);
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();

        let report = engine.tick(now).await.unwrap();
        assert_eq!(report.due, 1);
        assert!(report.notified.is_empty());
        assert!(report.dispatch.is_none());
        assert!(recorder.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tick_uses_local_date() {
        // 23:30 UTC on the 10th is already the 11th at UTC+8.
        let mut sub = due_soon("late");
        sub.expiry_date = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        sub.reminder_days = Some(0);
        let (mut engine, _, _) = setup(vec![sub], &[]);
        engine.reminder.timezone_offset_minutes = 480;

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let report = engine.tick(now).await.unwrap();
        assert_eq!(report.notified.len(), 1);
        assert_eq!(report.notified[0].days_until, 0);
    }

    #[tokio::test]
    async fn test_test_notify_is_rate_limited() {
        let (engine, recorder, store) = setup(vec![], &[]);
        let limiter = RateLimiter::new(
            store,
            "test_notify",
            RateLimitPolicy { max_requests: 2, window_secs: 60 },
        );

        assert!(engine.test_notify(&limiter, "alice").await.is_ok());
        assert!(engine.test_notify(&limiter, "alice").await.is_ok());
        let err = engine.test_notify(&limiter, "alice").await.unwrap_err();
        assert!(matches!(err, SubTrackError::RateLimited(_)));
        assert_eq!(recorder.messages.lock().unwrap().len(), 2);
    }
}
