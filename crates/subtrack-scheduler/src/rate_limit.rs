//! Fixed-window rate limiter over a shared counter store.
//!
//! Each `(action, identifier, window)` triple owns one counter. The counter is
//! read, incremented and written back without a lock, so two concurrent
//! requests in the same window may both read the same value and one increment
//! is lost. Counters expire a minute after their window closes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use subtrack_core::config::RateLimitPolicy;
use subtrack_core::{CounterStore, Result};

use crate::deadline::bounded;

/// Extra counter lifetime beyond the window.
const EXPIRY_SLACK_SECS: u64 = 60;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// The request that produced this result must be rejected.
    pub limited: bool,
    /// Count in the current window, this request included.
    pub current: u64,
    pub remaining: u64,
    /// Epoch milliseconds at which the window closes.
    pub reset_time: i64,
}

/// Counter key for one window.
pub fn bucket_key(action: &str, identifier: &str, bucket: i64) -> String {
    format!("ratelimit:{action}:{identifier}:{bucket}")
}

/// Count one request against the current window.
pub async fn check_and_increment(
    store: &dyn CounterStore,
    identifier: &str,
    action: &str,
    max_requests: u64,
    window: Duration,
) -> Result<RateLimitResult> {
    check_and_increment_at(
        store,
        identifier,
        action,
        max_requests,
        window,
        Utc::now().timestamp_millis(),
    )
    .await
}

/// [`check_and_increment`] at an explicit instant (epoch milliseconds).
pub async fn check_and_increment_at(
    store: &dyn CounterStore,
    identifier: &str,
    action: &str,
    max_requests: u64,
    window: Duration,
    now_ms: i64,
) -> Result<RateLimitResult> {
    let window_ms = (window.as_millis() as i64).max(1);
    let bucket = now_ms.div_euclid(window_ms);
    let key = bucket_key(action, identifier, bucket);

    let previous = store
        .get(&key)
        .await?
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let current = previous + 1;
    let ttl = (window_ms as u64).div_ceil(1000) + EXPIRY_SLACK_SECS;
    store.put(&key, &current.to_string(), ttl).await?;

    let limited = current > max_requests;
    if limited {
        tracing::warn!("🚫 Rate limit hit: {action} by {identifier} ({current}/{max_requests})");
    }
    Ok(RateLimitResult {
        limited,
        current,
        remaining: max_requests.saturating_sub(current),
        reset_time: (bucket + 1) * window_ms,
    })
}

/// A limiter bound to one action and policy.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    action: String,
    policy: RateLimitPolicy,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, action: &str, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            action: action.to_string(),
            policy,
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Bound every counter round trip by `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.store_timeout = limit;
        self
    }

    pub async fn check(&self, identifier: &str) -> Result<RateLimitResult> {
        self.check_at(identifier, Utc::now().timestamp_millis()).await
    }

    pub async fn check_at(&self, identifier: &str, now_ms: i64) -> Result<RateLimitResult> {
        bounded(
            self.store_timeout,
            "rate limit counter",
            check_and_increment_at(
                self.store.as_ref(),
                identifier,
                &self.action,
                self.policy.max_requests,
                self.policy.window(),
                now_ms,
            ),
        )
        .await
    }
}
