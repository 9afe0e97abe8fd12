//! # SubTrack Scheduler
//!
//! Due-date scanning, reminder dispatch, rate limiting and failure auditing
//! for tracked subscriptions.
//!
//! ## Architecture
//! ```text
//! tick (tokio interval)
//!   ├── DueDateScanner: list active → renew expired (batched) → decisions
//!   ├── time-of-day filter ("HH:mm" / "HH", per subscription or global)
//!   ├── ReminderFormatter → title + body
//!   └── NotificationDispatcher (all channels concurrently, each guarded)
//!         ├── broadcast channels: one message
//!         ├── per-recipient channels: one message per recipient group
//!         └── any failure → FailureLog (bounded index)
//!
//! Stores: SqliteStore (persistent) or MemoryStore (dry run / tests)
//! ```

pub mod audit;
pub mod deadline;
pub mod dispatch;
pub mod engine;
pub mod memory;
pub mod notify;
pub mod persistence;
pub mod rate_limit;
pub mod recipients;
pub mod scanner;
pub mod store;

pub use audit::FailureLog;
pub use dispatch::{DispatchReport, GuardedSender, NotificationDispatcher};
pub use engine::{ReminderEngine, TickReport, run_every};
pub use memory::MemoryStore;
pub use notify::{ReminderFormatter, is_reminder_time};
pub use persistence::SqliteStore;
pub use rate_limit::{RateLimitResult, RateLimiter, check_and_increment};
pub use recipients::distribute;
pub use scanner::{DueDateScanner, ScanOptions};
pub use store::SubscriptionFile;
