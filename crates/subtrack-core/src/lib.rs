//! # SubTrack Core
//!
//! Shared data model, configuration snapshot and the collaborator traits the
//! calendar, scheduler and channel crates are written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::SubTrackConfig;
pub use error::{ConversionError, Result, SubTrackError};
pub use traits::{AuditStore, ChannelSender, CounterStore, SubscriptionStore};
pub use types::{
    ChannelOutcome, FailureLogEntry, Period, PeriodUnit, ReminderDecision, Subscription,
};
