//! In-memory store — implements every collaborator store trait.
//! Used for dry runs and as the test double for scanner, limiter and audit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use subtrack_core::{AuditStore, CounterStore, Result, Subscription, SubscriptionStore, SubTrackError};

const MAX_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<BTreeMap<String, Subscription>>,
    counters: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    kv: Mutex<HashMap<String, String>>,
    /// Keys/ids whose writes fail with `StoreUnavailable`.
    failing: Mutex<HashSet<String>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| SubTrackError::store("memory store lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with subscriptions (active or not).
    pub fn with_subscriptions(subs: impl IntoIterator<Item = Subscription>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.subscriptions.lock() {
            for sub in subs {
                map.insert(sub.id.clone(), sub);
            }
        }
        store
    }

    /// Make every later write to `key` fail.
    pub fn fail_writes_to(&self, key: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(key.to_string());
        }
    }

    /// Every stored subscription, including inactive ones.
    pub fn all_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if lock(&self.failing)?.contains(key) {
            return Err(SubTrackError::store(format!("write to '{key}' rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Subscription>> {
        Ok(lock(&self.subscriptions)?
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(lock(&self.subscriptions)?.get(id).cloned())
    }

    async fn put(&self, id: &str, subscription: &Subscription) -> Result<()> {
        self.check_writable(id)?;
        lock(&self.subscriptions)?.insert(id.to_string(), subscription.clone());
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut counters = lock(&self.counters)?;
        match counters.get(key) {
            Some((_, expires_at)) if *expires_at <= Utc::now() => {
                counters.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.check_writable(key)?;
        let expires_at = Utc::now() + Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64);
        lock(&self.counters)?.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.kv)?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        lock(&self.kv)?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
