//! Data model shared by the calendar, scheduler and channel crates.
//!
//! Field names are the camelCase names persisted by existing stores, so the
//! records stay readable by the web front end that writes them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Unit of a recurrence period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    #[default]
    Month,
    Year,
}

impl std::fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodUnit::Day => write!(f, "day"),
            PeriodUnit::Month => write!(f, "month"),
            PeriodUnit::Year => write!(f, "year"),
        }
    }
}

impl std::str::FromStr for PeriodUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" | "d" => Ok(PeriodUnit::Day),
            "month" | "months" | "m" => Ok(PeriodUnit::Month),
            "year" | "years" | "y" => Ok(PeriodUnit::Year),
            other => Err(format!("unknown period unit '{other}'")),
        }
    }
}

/// A recurrence length such as "1 month" or "2 years".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub value: i32,
    pub unit: PeriodUnit,
}

impl Period {
    pub fn new(value: i32, unit: PeriodUnit) -> Self {
        Self { value, unit }
    }

    /// Number of units per step. Non-positive values count as one so that
    /// every recurrence loop makes progress.
    pub fn steps(&self) -> u32 {
        if self.value <= 0 { 1 } else { self.value as u32 }
    }
}

/// A tracked subscription as stored by the subscription store.
///
/// `expiry_date` is always a solar date; lunar mode only changes how the next
/// due date is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_type: Option<String>,
    #[serde(with = "solar_date")]
    pub expiry_date: NaiveDate,
    #[serde(default = "default_period_value")]
    pub period_value: i32,
    #[serde(default)]
    pub period_unit: PeriodUnit,
    #[serde(default)]
    pub use_lunar: bool,
    #[serde(default = "bool_true")]
    pub is_active: bool,
    #[serde(default = "bool_true")]
    pub auto_renew: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub daily_reminder_times: Vec<String>,
    /// Comma-separated recipient ids overriding the channel's global list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_recipients: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_period_value() -> i32 { 1 }
fn bool_true() -> bool { true }

impl Subscription {
    /// Create an active, auto-renewing subscription with a monthly period.
    pub fn new(id: &str, name: &str, expiry_date: NaiveDate) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            custom_type: None,
            expiry_date,
            period_value: 1,
            period_unit: PeriodUnit::Month,
            use_lunar: false,
            is_active: true,
            auto_renew: true,
            reminder_days: None,
            daily_reminder_times: Vec::new(),
            notify_recipients: None,
            notes: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    pub fn period(&self) -> Period {
        Period::new(self.period_value, self.period_unit)
    }

    /// Reminder window in days, falling back to `default_days` when unset.
    pub fn reminder_window(&self, default_days: i64) -> i64 {
        self.reminder_days.unwrap_or(default_days).max(0)
    }
}

/// One reminder produced by a scan.
///
/// `days_until < 0` means expired and not renewed; `0..=reminder_days` means
/// due soon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDecision {
    pub subscription: Subscription,
    pub days_until: i64,
}

impl ReminderDecision {
    pub fn is_expired(&self) -> bool {
        self.days_until < 0
    }
}

/// Result of one channel attempt inside a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub success: bool,
}

/// Audit record appended when a dispatch had at least one failed channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureLogEntry {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub failures: Vec<ChannelOutcome>,
    pub successes: Vec<ChannelOutcome>,
}

/// Serde adapter: writes `YYYY-MM-DD`, reads either that or an RFC 3339
/// timestamp (date part taken as-is).
pub mod solar_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, FORMAT) {
            return Some(date);
        }
        DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_field_names() {
        let sub = Subscription::new("s1", "Netflix", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["expiryDate"], "2024-05-01");
        assert_eq!(json["periodValue"], 1);
        assert_eq!(json["periodUnit"], "month");
        assert_eq!(json["useLunar"], false);
        assert_eq!(json["isActive"], true);
        assert_eq!(json["autoRenew"], true);
    }

    #[test]
    fn test_expiry_accepts_timestamp() {
        let json = r#"{"id":"a","expiryDate":"2024-03-15T00:00:00.000Z","periodUnit":"year"}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.expiry_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(sub.period_unit, PeriodUnit::Year);
        assert!(sub.is_active);
        assert!(sub.auto_renew);
    }

    #[test]
    fn test_expiry_rejects_garbage() {
        let json = r#"{"id":"a","expiryDate":"soon"}"#;
        assert!(serde_json::from_str::<Subscription>(json).is_err());
    }

    #[test]
    fn test_period_steps_coerced() {
        assert_eq!(Period::new(0, PeriodUnit::Day).steps(), 1);
        assert_eq!(Period::new(-3, PeriodUnit::Month).steps(), 1);
        assert_eq!(Period::new(3, PeriodUnit::Year).steps(), 3);
    }

    #[test]
    fn test_reminder_window_fallback() {
        let mut sub = Subscription::new("s", "x", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(sub.reminder_window(7), 7);
        sub.reminder_days = Some(3);
        assert_eq!(sub.reminder_window(7), 3);
        sub.reminder_days = Some(-2);
        assert_eq!(sub.reminder_window(7), 0);
    }

    #[test]
    fn test_period_unit_parse() {
        assert_eq!("Months".parse::<PeriodUnit>().unwrap(), PeriodUnit::Month);
        assert!("fortnight".parse::<PeriodUnit>().is_err());
    }
}
