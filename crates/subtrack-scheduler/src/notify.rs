//! Reminder content and time-of-day filtering.
//! The scanner decides *whether* a subscription is due; this module decides
//! *what* to say and whether this minute is a reminder minute.

use chrono::{NaiveTime, Timelike};
use subtrack_calendar::lunar;
use subtrack_core::{ReminderDecision, Subscription};

/// Renders reminder titles and bodies.
#[derive(Debug, Clone)]
pub struct ReminderFormatter {
    pub title: String,
    /// Append the lunar date for lunar-mode subscriptions.
    pub show_lunar: bool,
}

impl Default for ReminderFormatter {
    fn default() -> Self {
        Self {
            title: "📅 Subscription reminder".into(),
            show_lunar: true,
        }
    }
}

impl ReminderFormatter {
    /// Title and body for a batch of decisions.
    pub fn render(&self, decisions: &[ReminderDecision]) -> (String, String) {
        (self.title.clone(), self.body(decisions))
    }

    /// One block per decision, separated by blank lines.
    pub fn body<'a>(&self, decisions: impl IntoIterator<Item = &'a ReminderDecision>) -> String {
        decisions
            .into_iter()
            .map(|d| self.block(d))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn block(&self, decision: &ReminderDecision) -> String {
        let sub = &decision.subscription;
        let emoji = match decision.days_until {
            d if d < 0 => "🔴",
            0 => "🟡",
            _ => "🟢",
        };
        let mut lines = vec![format!("{emoji} {}", display_name(sub))];
        if let Some(kind) = sub.custom_type.as_deref().filter(|k| !k.is_empty()) {
            lines.push(format!("Type: {kind}"));
        }

        let mut expiry = format!("Expiry: {}", sub.expiry_date.format("%Y-%m-%d"));
        if self.show_lunar && sub.use_lunar {
            match lunar::solar_date_to_lunar(sub.expiry_date) {
                Ok(l) => expiry.push_str(&format!(" (lunar {l})")),
                Err(e) => tracing::debug!("No lunar date for '{}': {e}", sub.id),
            }
        }
        lines.push(expiry);
        lines.push(status_line(decision.days_until));
        lines.push(format!("Auto-renew: {}", if sub.auto_renew { "on" } else { "off" }));
        if let Some(notes) = sub.notes.as_deref().filter(|n| !n.is_empty()) {
            lines.push(format!("Notes: {notes}"));
        }
        lines.join("\n")
    }
}

fn display_name(sub: &Subscription) -> &str {
    if sub.name.is_empty() { &sub.id } else { &sub.name }
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Human status for a signed day count.
pub fn status_line(days_until: i64) -> String {
    match days_until {
        0 => "⏰ Expires today".into(),
        d if d > 0 => format!("Expires in {d} day{}", plural(d)),
        d => format!("⚠️ Expired {} day{} ago", -d, plural(-d)),
    }
}

/// Whether `now` is a reminder minute for `sub`.
///
/// The subscription's own `dailyReminderTimes` win over `global_times`.
/// An empty effective list matches every minute. Entries are `"HH:mm"`
/// (exact minute) or `"HH"` (any minute of that hour).
pub fn is_reminder_time(sub: &Subscription, now: NaiveTime, global_times: &[String]) -> bool {
    let times = if sub.daily_reminder_times.is_empty() {
        global_times
    } else {
        sub.daily_reminder_times.as_slice()
    };
    times.is_empty() || times.iter().any(|t| matches_time(t, now))
}

fn matches_time(spec: &str, now: NaiveTime) -> bool {
    let spec = spec.trim();
    let parsed = match spec.split_once(':') {
        Some((h, m)) => h.trim().parse::<u32>().ok().zip(m.trim().parse::<u32>().ok().map(Some)),
        None => spec.parse::<u32>().ok().map(|h| (h, None)),
    };
    match parsed {
        Some((hour, Some(minute))) => now.hour() == hour && now.minute() == minute,
        Some((hour, None)) => now.hour() == hour,
        None => {
            tracing::warn!("⚠️ Ignoring malformed reminder time '{spec}'");
            false
        }
    }
}

/// Keep only the decisions whose reminder time matches `now`.
pub fn filter_by_time(
    decisions: Vec<ReminderDecision>,
    now: NaiveTime,
    global_times: &[String],
) -> Vec<ReminderDecision> {
    decisions
        .into_iter()
        .filter(|d| is_reminder_time(&d.subscription, now, global_times))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn decision(name: &str, days_until: i64) -> ReminderDecision {
        let sub = Subscription::new(name, name, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        ReminderDecision { subscription: sub, days_until }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(status_line(0), "⏰ Expires today");
        assert_eq!(status_line(1), "Expires in 1 day");
        assert_eq!(status_line(5), "Expires in 5 days");
        assert_eq!(status_line(-2), "⚠️ Expired 2 days ago");
    }

    #[test]
    fn test_body_contains_every_subscription() {
        let f = ReminderFormatter::default();
        let (title, body) = f.render(&[decision("Netflix", 3), decision("VPS", -1)]);
        assert!(title.contains("reminder"));
        assert!(body.contains("🟢 Netflix"));
        assert!(body.contains("🔴 VPS"));
        assert!(body.contains("Expiry: 2024-02-10"));
        assert_eq!(body.matches("\n\n").count(), 1);
    }

    #[test]
    fn test_lunar_date_shown_for_lunar_subscriptions() {
        let mut d = decision("Festival", 0);
        d.subscription.use_lunar = true;
        let body = ReminderFormatter::default().body([&d]);
        assert!(body.contains("二〇二四年正月初一"), "{body}");

        let hidden = ReminderFormatter { show_lunar: false, ..Default::default() }.body([&d]);
        assert!(!hidden.contains("正月"));
    }

    #[test]
    fn test_global_times() {
        let sub = decision("x", 1).subscription;
        let global = vec!["08:00".to_string(), "20".to_string()];
        assert!(is_reminder_time(&sub, at(8, 0), &global));
        assert!(!is_reminder_time(&sub, at(8, 1), &global));
        assert!(is_reminder_time(&sub, at(20, 45), &global));
        assert!(!is_reminder_time(&sub, at(9, 0), &global));
    }

    #[test]
    fn test_subscription_times_override_global() {
        let mut sub = decision("x", 1).subscription;
        sub.daily_reminder_times = vec!["09:30".into()];
        let global = vec!["08:00".to_string()];
        assert!(!is_reminder_time(&sub, at(8, 0), &global));
        assert!(is_reminder_time(&sub, at(9, 30), &global));
    }

    #[test]
    fn test_no_times_means_always() {
        let sub = decision("x", 1).subscription;
        assert!(is_reminder_time(&sub, at(3, 17), &[]));
    }

    #[test]
    fn test_malformed_time_never_matches() {
        let sub = decision("x", 1).subscription;
        assert!(!is_reminder_time(&sub, at(8, 0), &["eight".to_string()]));
    }

    #[test]
    fn test_filter_by_time() {
        let mut late = decision("late", 1);
        late.subscription.daily_reminder_times = vec!["21:00".into()];
        let kept = filter_by_time(vec![decision("early", 1), late], at(8, 0), &["08:00".into()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].subscription.name, "early");
    }
}
