//! Due-date scan: decide which subscriptions need a reminder today and roll
//! expired auto-renewing subscriptions forward.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use subtrack_calendar::next_due_date;
use subtrack_core::{ReminderDecision, Result, SubTrackConfig, Subscription, SubscriptionStore};

use crate::deadline::bounded;

/// Scan tuning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Window used by subscriptions without `reminderDays`.
    pub default_window_days: i64,
    /// Limit for each store round trip.
    pub store_timeout: Duration,
    /// Renewals persisted concurrently per batch.
    pub renew_batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            default_window_days: 7,
            store_timeout: Duration::from_secs(5),
            renew_batch_size: 4,
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &SubTrackConfig) -> Self {
        Self {
            default_window_days: config.reminder.default_window_days,
            store_timeout: config.storage.store_timeout(),
            renew_batch_size: config.storage.renew_batch_size.max(1),
        }
    }
}

/// Whole days from `today` to `expiry` (negative once expired).
pub fn days_until(expiry: NaiveDate, today: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

/// Scans the subscription store once per tick.
pub struct DueDateScanner {
    store: Arc<dyn SubscriptionStore>,
    options: ScanOptions,
}

impl DueDateScanner {
    pub fn new(store: Arc<dyn SubscriptionStore>, options: ScanOptions) -> Self {
        Self { store, options }
    }

    /// Reminder decisions for `today`, in store order.
    ///
    /// Expired auto-renewing subscriptions get their next due date persisted
    /// (with `updated_at = now`) before being judged again; a renewal that
    /// fails to compute or persist drops that subscription from this scan.
    /// Expired subscriptions without auto-renew are reported every scan.
    pub async fn scan(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<Vec<ReminderDecision>> {
        let subs = bounded(
            self.options.store_timeout,
            "list subscriptions",
            self.store.list_active(),
        )
        .await?;

        let mut decisions: Vec<(usize, ReminderDecision)> = Vec::new();
        let mut renewals: Vec<(usize, Subscription)> = Vec::new();

        for (idx, sub) in subs.into_iter().enumerate() {
            if !sub.is_active {
                continue;
            }
            let days = days_until(sub.expiry_date, today);
            if days < 0 && sub.auto_renew {
                renewals.push((idx, sub));
            } else if days < 0 || days <= sub.reminder_window(self.options.default_window_days) {
                decisions.push((idx, ReminderDecision { subscription: sub, days_until: days }));
            }
        }

        let renewal_count = renewals.len();
        for batch in renewals.chunks(self.options.renew_batch_size.max(1)) {
            let results = join_all(batch.iter().map(|(idx, sub)| async move {
                self.renew(sub, today, now).await.map(|d| (*idx, d))
            }))
            .await;
            decisions.extend(results.into_iter().flatten());
        }

        decisions.sort_by_key(|(idx, _)| *idx);
        tracing::info!(
            "🔎 Scan {today}: {} reminder(s), {renewal_count} renewal(s) attempted",
            decisions.len()
        );
        Ok(decisions.into_iter().map(|(_, d)| d).collect())
    }

    /// Roll `sub` forward and persist it. Returns a decision when the new
    /// due date falls inside the reminder window.
    async fn renew(
        &self,
        sub: &Subscription,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<ReminderDecision> {
        let next = next_due_date(sub.expiry_date, sub.period(), sub.use_lunar, today);
        if next < today {
            tracing::warn!(
                "⚠️ Could not roll '{}' past {} (stopped at {next}), skipping",
                sub.id,
                sub.expiry_date
            );
            return None;
        }

        let mut renewed = sub.clone();
        renewed.expiry_date = next;
        renewed.updated_at = Some(now);

        let put = self.store.put(&renewed.id, &renewed);
        if let Err(e) = bounded(self.options.store_timeout, "persist renewal", put).await {
            tracing::warn!("⚠️ Renewal of '{}' not saved: {e}", sub.id);
            return None;
        }
        tracing::info!("🔁 '{}' renewed: {} → {next}", sub.id, sub.expiry_date);

        let days = days_until(next, today);
        (days <= renewed.reminder_window(self.options.default_window_days))
            .then_some(ReminderDecision { subscription: renewed, days_until: days })
    }
}
